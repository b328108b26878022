//! # 完成桥（ProxyHandoff）
//!
//! ## 核心意图（Why）
//! - 作为 HTTP 响应写出路径调用的唯一入口，把“判定 → 拆解 → 适配 →
//!   提交”的序列从事件循环搬到阻塞工作线程上执行，缓慢或挂起的扩展
//!   不会拖停事件循环；
//! - 把调度结果折算为传输层可直接执行的指令：继续 HTTP、保持打开
//!   （扩展已接管）、或关闭。
//!
//! ## 状态机（What）
//! 每条连接每次交换经历：响应写出（入口）→ 升级判定 →
//! `NO_UPGRADE`（[`CompletionDirective::ContinueHttp`]）或
//! 适配 → 提交 → `TAKEN_OVER`（[`CompletionDirective::KeepOpen`]）/
//! `NOT_TAKEN_OVER`（[`CompletionDirective::Close`]）。三个出口对本
//! 模块均为终态，后续动作（继续流水线或关闭）由传输层执行。

use crate::adapter::ConnectionAdapter;
use crate::dispatcher::{HandoffDispatcher, HandoffOutcome};
use crate::exchange::Exchange;
use crate::policy;
use relay_transport_tcp::ProxyChannel;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

/// 交换完成后传输层应执行的动作。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `ContinueHttp`：本次交换不构成升级，通道原样交还，按普通 HTTP
///     规则收尾（保活或关闭，不在本核心范围内）；
///   - `KeepOpen`：扩展已接管连接，传输层必须停止一切读写；
///   - `Close`：无扩展认领（或移交中途不可恢复），连接已被释放，
///     调用方按关闭处理；
/// - **风险 (Trade-offs)**：指令标注 `#[must_use]`——丢弃它等于丢弃
///   连接所有权的最终裁决。
#[derive(Debug)]
#[must_use]
pub enum CompletionDirective {
    /// 非升级交换，通道交还调用方继续 HTTP 流水线。
    ContinueHttp(ProxyChannel),
    /// 扩展已接管，连接在扩展控制下保持打开。
    KeepOpen,
    /// 连接应按已关闭处理。
    Close,
}

impl CompletionDirective {
    /// 连接是否在扩展控制下保持打开（对应对外契约中的布尔返回值）。
    pub fn remains_open(&self) -> bool {
        matches!(self, CompletionDirective::KeepOpen)
    }
}

/// 响应完成路径与协议扩展之间的移交门面。
///
/// # 教案式说明
/// - **意图 (Why)**：传输层只需在写完响应后调用
///   [`post_write_response`](Self::post_write_response)，无需了解判定
///   策略、适配细节或监听器注册表；
/// - **契约 (What)**：内部持有 [`HandoffDispatcher`] 的共享引用，可被
///   多条连接并发调用；每次调用至多构造一个适配器；
/// - **风险 (Trade-offs)**：提交在 `spawn_blocking` 工作线程上运行且
///   不设超时，监听器挂起会占用一个阻塞线程（见调度器文档的风险
///   边界说明）。
#[derive(Debug)]
pub struct ProxyHandoff {
    dispatcher: Arc<HandoffDispatcher>,
}

impl ProxyHandoff {
    /// 以装配完成的调度器构造门面。
    #[must_use]
    pub fn new(dispatcher: HandoffDispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// 响应写出后决定连接去向。
    ///
    /// # 教案式注释
    /// - **逻辑 (How)**：
    ///   1. 纯函数判定（事件循环线程上完成，零 IO）；不构成升级则把
    ///      通道原样还给调用方；
    ///   2. 拆解通道并构造阻塞适配器——适配器每次移交尝试至多创建一个；
    ///   3. 交换与适配器移入 `spawn_blocking` 工作线程执行提交，事件
    ///      循环仅等待结果；期间调用方已无法触碰通道（所有权已移入）；
    ///   4. 结果折算为 [`CompletionDirective`]，交换状态恢复到调用方的
    ///      可变引用中。
    /// - **契约 (What)**：
    ///   - **前置条件**：响应已完整写出；`channel` 为该连接的最后一个
    ///     克隆（HTTP 流水线在进入完成路径前释放其余句柄）；
    ///   - **后置条件**：返回 `Close` 时连接已释放（适配器按 RAII 关闭
    ///     恰好一次）；返回 `KeepOpen` 后本核心不再持有连接；
    ///   - **错误语义**：移交内部的故障（通道仍被共享、适配失败、提交
    ///     任务丢失）均不外抛错误类型，统一折算为 `Close` 并记录日志。
    pub async fn post_write_response(
        &self,
        exchange: &mut Exchange,
        channel: ProxyChannel,
    ) -> CompletionDirective {
        if !policy::should_attempt_handoff(exchange) {
            return CompletionDirective::ContinueHttp(channel);
        }

        let parts = match channel.try_into_parts() {
            Ok(parts) => parts,
            Err(channel) => {
                tracing::error!(
                    peer_addr = %channel.peer_addr(),
                    "channel still shared after response completion, handoff aborted"
                );
                return CompletionDirective::Close;
            }
        };
        let adapter = match ConnectionAdapter::adapt(parts) {
            Ok(adapter) => adapter,
            Err(error) => {
                tracing::error!(error = %error, "failed to adapt connection for handoff");
                return CompletionDirective::Close;
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let cell = Arc::new(Mutex::new(mem::take(exchange)));
        let worker_cell = Arc::clone(&cell);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = lock_exchange(&worker_cell);
            dispatcher.offer(&mut guard, adapter)
        })
        .await;

        // 无论工作线程如何收场，都先把交换状态还给调用方。
        *exchange = mem::take(&mut *lock_exchange(&cell));

        match result {
            Ok(HandoffOutcome::TakenOver) => CompletionDirective::KeepOpen,
            Ok(HandoffOutcome::NotTakenOver(conn)) => {
                tracing::debug!(
                    peer_addr = %conn.peer_addr(),
                    "no extension claimed the connection"
                );
                drop(conn);
                CompletionDirective::Close
            }
            Err(error) => {
                tracing::error!(error = %error, "offer task lost, closing connection");
                CompletionDirective::Close
            }
        }
    }
}

fn lock_exchange(cell: &Mutex<Exchange>) -> MutexGuard<'_, Exchange> {
    match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
