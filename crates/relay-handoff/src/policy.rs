//! # 升级判定策略（UpgradeDecisionPolicy）
//!
//! 响应写出后，判定该连接是否值得尝试移交给持久连接扩展。纯函数，
//! 不产生任何副作用，可在事件循环线程上直接调用。

use crate::exchange::{Exchange, keys};

/// HTTP 101 Switching Protocols。
pub const SWITCHING_PROTOCOLS: u16 = 101;

/// 判定刚完成的交换是否应进入移交流程。
///
/// # 教案式注释
/// - **意图 (Why)**：把“是否值得构造阻塞适配器”收敛为一个可独立测试
///   的谓词，调度与适配的开销只在判定通过后才发生；
/// - **契约 (What)**：
///   - 多路复用标记（[`keys::MULTIPLEXED`]）优先于其余检查：复用传输
///     上的交换即便状态码为 101 也不具备裸接管资格，立即返回 `false`；
///   - 否则状态码等于 101，或响应被标记为开放式事件流时返回 `true`；
///   - 状态码缺失只令 101 比较落空，事件流标记作为独立元数据仍然
///     生效；两者皆无则按普通 HTTP 收尾处理，返回 `false`。
#[must_use]
pub fn should_attempt_handoff(exchange: &Exchange) -> bool {
    if exchange.property_bool(keys::MULTIPLEXED) {
        return false;
    }
    exchange.status_code() == Some(SWITCHING_PROTOCOLS) || exchange.is_event_stream()
}
