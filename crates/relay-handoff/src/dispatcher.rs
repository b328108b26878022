//! # 移交调度器（HandoffDispatcher）
//!
//! ## 核心意图（Why）
//! - 持有进程启动时注册的持久连接扩展监听器，按注册顺序把适配后的
//!   连接逐一提交给它们，首个接受者获得所有权；
//! - 维护交换上的升级状态槽：同一交换被多次提交时复用既有状态，
//!   扩展无需重建协议上下文。
//!
//! ## 并发约束（What）
//! - 提交序列为单线程顺序扫描，扫描期间只有当前被调用的监听器可以
//!   触碰连接（所有权随 [`Takeover`] 在调度器与监听器之间往返）；
//! - 调度器不对监听器调用施加超时，也不支持中途取消——挂起的监听器
//!   是外层调用方需要自行包裹截止时间的已接受风险边界。

use crate::adapter::ConnectionAdapter;
use crate::error::HandoffError;
use crate::exchange::{Exchange, UpgradeState};
use std::fmt;
use std::sync::Arc;

/// 持久连接扩展监听器。
///
/// # 教案式说明
/// - **意图 (Why)**：以单方法 trait 建模“尝试接管连接”这一能力，各
///   协议扩展（WebSocket 隧道、SSE 转发等）各自实现，避免依赖任何
///   具体的类层次；
/// - **契约 (What)**：
///   - 监听器在进程启动时注册，存活于进程整个生命周期，可能被调用
///     零次或多次；
///   - 返回 [`Takeover::Accepted`] 即表示所有权转移完成且不可撤回，
///     此后只有监听器可以触碰连接；
///   - 放弃或失败都必须交还适配器，扫描才能继续；
/// - **风险 (Trade-offs)**：方法在阻塞工作线程上调用，允许阻塞 IO；
///   实现不应 panic——panic 不在“失败视同放弃”契约之内，会使整次
///   提交作废（连接随栈展开关闭）。
pub trait PersistentConnectionListener: Send + Sync {
    /// 监听器名称，仅用于日志。
    fn name(&self) -> &str;

    /// 尝试接管连接。
    fn attempt_takeover(
        &self,
        exchange: &mut Exchange,
        conn: ConnectionAdapter,
        state: &Arc<UpgradeState>,
    ) -> Takeover;
}

/// 单个监听器对接管尝试的答复。
#[derive(Debug)]
pub enum Takeover {
    /// 接管成功，监听器从此独占连接。
    Accepted,
    /// 放弃接管，适配器交还调度器供后续监听器使用。
    Declined(ConnectionAdapter),
    /// 尝试过程中失败；视同放弃，错误仅用于日志。
    Failed {
        conn: ConnectionAdapter,
        error: HandoffError,
    },
}

/// 一次提交的最终结果。
///
/// - **契约 (What)**：`NotTakenOver` 携带适配器交还调用方，由调用方
///   关闭恰好一次；`TakenOver` 后传输层必须停止对连接的一切读写。
#[derive(Debug)]
#[must_use]
pub enum HandoffOutcome {
    /// 某个扩展已接管连接。
    TakenOver,
    /// 无扩展认领；所有权回归调用方。
    NotTakenOver(ConnectionAdapter),
}

impl HandoffOutcome {
    /// 是否已被扩展接管。
    pub fn is_taken_over(&self) -> bool {
        matches!(self, HandoffOutcome::TakenOver)
    }
}

/// 按注册顺序扫描监听器的调度器。
pub struct HandoffDispatcher {
    listeners: Vec<Arc<dyn PersistentConnectionListener>>,
}

impl fmt::Debug for HandoffDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for HandoffDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffDispatcher {
    /// 构造空调度器。
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// 以既有监听器列表构造调度器，列表顺序即评估顺序。
    #[must_use]
    pub fn with_listeners(listeners: Vec<Arc<dyn PersistentConnectionListener>>) -> Self {
        Self { listeners }
    }

    /// 追加注册一个监听器，评估顺序为注册顺序。
    pub fn register(&mut self, listener: Arc<dyn PersistentConnectionListener>) {
        self.listeners.push(listener);
    }

    /// 已注册的监听器数量。
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// 是否没有任何监听器。
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// 把适配后的连接按注册顺序提交给各监听器，首个接受者获胜。
    ///
    /// # 教案式注释
    /// - **逻辑 (How)**：
    ///   1. 复用交换上既有的升级状态；不存在则创建并写回槽位；
    ///   2. 线性扫描监听器：`Accepted` 立即返回 [`HandoffOutcome::TakenOver`]；
    ///      `Declined` 取回适配器继续；`Failed` 记录告警后视同放弃；
    ///   3. 扫描耗尽仍无人认领，适配器随 [`HandoffOutcome::NotTakenOver`]
    ///      交还调用方。
    /// - **契约 (What)**：
    ///   - **前置条件**：在允许阻塞的工作线程上调用（监听器可能做阻塞 IO）；
    ///   - **后置条件**：升级状态槽已填充，其 `offers` 计数加一；
    ///   - 调度器自身不关闭连接，`NotTakenOver` 的关闭动作由调用方执行。
    pub fn offer(&self, exchange: &mut Exchange, mut conn: ConnectionAdapter) -> HandoffOutcome {
        let state = match exchange.upgrade_state() {
            Some(state) => Arc::clone(state),
            None => {
                let state = Arc::new(UpgradeState::new(conn.peer_addr()));
                exchange.set_upgrade_state(Arc::clone(&state));
                state
            }
        };
        let attempt = state.record_offer();
        if !conn.can_read() {
            tracing::debug!(
                peer_addr = %conn.peer_addr(),
                "offering write-only adapter to listeners"
            );
        }

        for listener in &self.listeners {
            match listener.attempt_takeover(exchange, conn, &state) {
                Takeover::Accepted => {
                    tracing::debug!(
                        listener = listener.name(),
                        attempt,
                        peer_addr = %state.peer_addr(),
                        "connection taken over"
                    );
                    return HandoffOutcome::TakenOver;
                }
                Takeover::Declined(returned) => conn = returned,
                Takeover::Failed {
                    conn: returned,
                    error,
                } => {
                    tracing::warn!(
                        listener = listener.name(),
                        error = %error,
                        "listener failed during takeover, treated as declined"
                    );
                    conn = returned;
                }
            }
        }
        HandoffOutcome::NotTakenOver(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::sync::Mutex;

    enum Mode {
        Accept,
        Decline,
        Fail,
    }

    struct ScriptedListener {
        name: &'static str,
        mode: Mode,
        calls: Arc<Mutex<Vec<&'static str>>>,
        seen_state: Mutex<Option<Arc<UpgradeState>>>,
    }

    impl ScriptedListener {
        fn new(name: &'static str, mode: Mode, calls: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                mode,
                calls: Arc::clone(calls),
                seen_state: Mutex::new(None),
            })
        }
    }

    impl PersistentConnectionListener for ScriptedListener {
        fn name(&self) -> &str {
            self.name
        }

        fn attempt_takeover(
            &self,
            _exchange: &mut Exchange,
            conn: ConnectionAdapter,
            state: &Arc<UpgradeState>,
        ) -> Takeover {
            self.calls.lock().unwrap().push(self.name);
            *self.seen_state.lock().unwrap() = Some(Arc::clone(state));
            match self.mode {
                Mode::Accept => Takeover::Accepted,
                Mode::Decline => Takeover::Declined(conn),
                Mode::Fail => Takeover::Failed {
                    conn,
                    error: HandoffError::ListenerFailure {
                        listener: self.name.to_string(),
                        detail: "scripted failure".to_string(),
                    },
                },
            }
        }
    }

    fn test_adapter() -> (ConnectionAdapter, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("监听回环地址应成功");
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).expect("回环连接应成功");
        let (server, _) = listener.accept().expect("接受回环连接应成功");
        (ConnectionAdapter::over_stream(client, Bytes::new()), server)
    }

    #[test]
    fn first_acceptor_wins_and_stops_the_scan() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = HandoffDispatcher::with_listeners(vec![
            ScriptedListener::new("first", Mode::Decline, &calls),
            ScriptedListener::new("second", Mode::Accept, &calls),
            ScriptedListener::new("third", Mode::Decline, &calls),
        ]);
        let (adapter, _peer) = test_adapter();
        let mut exchange = Exchange::new();

        let outcome = dispatcher.offer(&mut exchange, adapter);
        assert!(outcome.is_taken_over());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["first", "second"],
            "接受者之后的监听器不应再被调用"
        );
    }

    #[test]
    fn exhausted_scan_returns_the_adapter() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = HandoffDispatcher::with_listeners(vec![
            ScriptedListener::new("first", Mode::Decline, &calls),
            ScriptedListener::new("second", Mode::Decline, &calls),
        ]);
        let (adapter, _peer) = test_adapter();
        let mut exchange = Exchange::new();

        match dispatcher.offer(&mut exchange, adapter) {
            HandoffOutcome::NotTakenOver(conn) => drop(conn),
            HandoffOutcome::TakenOver => panic!("无人接受时不应返回 TakenOver"),
        }
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn empty_dispatcher_resolves_to_not_taken_over() {
        let dispatcher = HandoffDispatcher::new();
        let (adapter, _peer) = test_adapter();
        let mut exchange = Exchange::new();

        let outcome = dispatcher.offer(&mut exchange, adapter);
        assert!(!outcome.is_taken_over());
    }

    #[test]
    fn write_only_adapter_is_still_offered_to_listeners() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = HandoffDispatcher::with_listeners(vec![
            ScriptedListener::new("first", Mode::Decline, &calls),
            ScriptedListener::new("second", Mode::Decline, &calls),
        ]);
        let listener = TcpListener::bind("127.0.0.1:0").expect("监听回环地址应成功");
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).expect("回环连接应成功");
        let (_server, _) = listener.accept().expect("接受回环连接应成功");
        let adapter = ConnectionAdapter::write_only_over_stream(client);
        assert!(!adapter.can_read(), "读半部缺失的适配器应报告降级");
        let mut exchange = Exchange::new();

        // 读能力缺失只是信息性信号，扫描必须照常进行并正常收尾。
        match dispatcher.offer(&mut exchange, adapter) {
            HandoffOutcome::NotTakenOver(conn) => {
                assert!(!conn.can_read(), "交还的适配器应保持只写降级状态");
            }
            HandoffOutcome::TakenOver => panic!("无人接受时不应返回 TakenOver"),
        }
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn listener_failure_is_treated_as_decline() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = HandoffDispatcher::with_listeners(vec![
            ScriptedListener::new("broken", Mode::Fail, &calls),
            ScriptedListener::new("tunnel", Mode::Accept, &calls),
        ]);
        let (adapter, _peer) = test_adapter();
        let mut exchange = Exchange::new();

        let outcome = dispatcher.offer(&mut exchange, adapter);
        assert!(outcome.is_taken_over(), "失败监听器之后的扫描应继续");
        assert_eq!(*calls.lock().unwrap(), vec!["broken", "tunnel"]);
    }

    #[test]
    fn repeated_offers_reuse_the_stored_upgrade_state() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listener = ScriptedListener::new("observer", Mode::Decline, &calls);
        let dispatcher = HandoffDispatcher::with_listeners(vec![Arc::clone(&listener) as _]);
        let mut exchange = Exchange::new();

        let (adapter, _peer_a) = test_adapter();
        let _ = dispatcher.offer(&mut exchange, adapter);
        let first_state = Arc::clone(exchange.upgrade_state().expect("首次提交应填充状态槽"));

        let (adapter, _peer_b) = test_adapter();
        let _ = dispatcher.offer(&mut exchange, adapter);
        let second_seen = listener
            .seen_state
            .lock()
            .unwrap()
            .clone()
            .expect("监听器应收到状态");

        assert!(
            Arc::ptr_eq(&first_state, &second_seen),
            "二次提交应按同一性复用既有升级状态"
        );
        assert_eq!(first_state.offers(), 2);
    }
}
