#![doc = r#"
# relay-handoff

## 设计动机（Why）
- **定位**：该 crate 实现 relay 代理在一次 HTTP 交换完成后的连接去向
  决策与协议移交：连接是关闭、回归普通 HTTP 流水线，还是移交给某个
  持久连接扩展（WebSocket 隧道、SSE 长流等）。
- **架构边界**：代理主传输是事件驱动的，而扩展期望阻塞套接字接口。
  本 crate 以 [`ConnectionAdapter`] 跨越这道边界——同一传输资源之上的
  阻塞视图，不新建连接、不丢失事件驱动层已缓冲的字节。
- **对外契约**：HTTP 解析、TLS 终止、执行器与扩展注册表均为外部协作
  方；本 crate 不实现任何 WebSocket/SSE 协议，只决定“是否以及如何”
  停止把连接当作 HTTP。

## 组件与数据流（What）
响应写出 → [`should_attempt_handoff`] 判定 → 需要持久化时
[`ConnectionAdapter::adapt`] 包装通道 → [`HandoffDispatcher::offer`]
按注册顺序提交给扩展，首个接受者获胜 → 结果由 [`ProxyHandoff`] 折算为
[`CompletionDirective`] 交回传输层。

## 错误与资源模型（Trade-offs）
- 所有故障局部消化：读半部缺失降级为只写适配器，监听器失败视同放弃，
  无人认领不是错误；对外只暴露二元去向，从不抛出独立错误类型；
- 连接所有权在结果边界上原子转移：结果未知前只有适配器可触碰连接，
  `TAKEN_OVER` 后只有监听器可以，`NOT_TAKEN_OVER` 后回归调用方并
  恰好关闭一次；
- 监听器调用不设超时、不可中途取消，这是显式接受的风险边界。
"#]

mod adapter;
mod bridge;
mod dispatcher;
mod error;
mod exchange;
mod policy;

pub use adapter::ConnectionAdapter;
pub use bridge::{CompletionDirective, ProxyHandoff};
pub use dispatcher::{HandoffDispatcher, HandoffOutcome, PersistentConnectionListener, Takeover};
pub use error::HandoffError;
pub use exchange::{Exchange, PropertyValue, UpgradeState, keys};
pub use policy::{SWITCHING_PROTOCOLS, should_attempt_handoff};
