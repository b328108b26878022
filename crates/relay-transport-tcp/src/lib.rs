#![doc = r#"
# relay-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 relay 代理在 Tokio 运行时上的最小 TCP 通道实现，
  封装监听、建连、读写与半关闭等底层细节。
- **架构角色**：作为事件驱动侧的传输积木，向 HTTP 解码器提供统一的
  字节流视图，并通过“已读回退”缓冲保证解码器多读出的字节不会丢失。
- **协议移交**：通道支持在唯一持有者场景下拆解为裸 `TcpStream` 与剩余
  回退字节（[`ChannelParts`]），这是 `relay-handoff` 构造阻塞适配层的
  唯一入口。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现；
- **输出保障**：监听、通道读写、回退与半关闭均返回语义化结果，出错时
  附带稳定操作标签的 [`TransportError`]；
- **字节序保证**：通过 [`ProxyChannel::unread`] 退回的字节总是先于线上
  新字节被读到，拆解后同样由 `ChannelParts::unread` 原样携带。

## 风险与考量（Trade-offs）
- **并发度**：当前实现通过 `tokio::sync::Mutex` 序列化读写；代理的
  每连接单任务模型下不构成瓶颈；
- **取消语义**：通道操作不内置超时与取消，调用方如需截止控制应在
  外层用 `tokio::time::timeout` 组合。
"#]

mod channel;
mod error;
mod listener;

pub use channel::{ChannelParts, ProxyChannel, ShutdownDirection};
pub use error::TransportError;
pub use listener::ProxyListener;
