//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 TCP 通道的所有网络操作提供带稳定操作标签的错误类型，
//!   让日志与上层处置逻辑能够区分失败发生在哪一步；
//! - 避免直接向上抛裸 `io::Error`，丢失“哪个操作失败”的语境。
//!
//! ## 设计要求（What）
//! - 错误类型实现 `thiserror::Error`，保持与生态兼容；
//! - 操作标签为 `'static` 字符串常量，集中定义于本模块，
//!   确保同一操作在所有调用点使用同一标签。

use std::io;

use thiserror::Error;

pub(crate) const BIND: &str = "bind";
pub(crate) const ACCEPT: &str = "accept";
pub(crate) const CONNECT: &str = "connect";
pub(crate) const READ: &str = "read";
pub(crate) const WRITE: &str = "write";
pub(crate) const SHUTDOWN: &str = "shutdown";

/// TCP 传输层错误，携带失败的操作标签与底层 `io::Error`。
///
/// # 教案式说明
/// - **意图 (Why)**：同一条连接上 `read` 与 `shutdown` 的失败含义完全不同，
///   标签让调用方无需解析消息文本即可分流处理；
/// - **契约 (What)**：`op()` 返回本模块定义的稳定标签；`kind()` 透出底层
///   `io::ErrorKind`；错误自身满足 `Send + Sync + 'static`；
/// - **风险 (Trade-offs)**：不区分可重试/不可重试类别，留给上层依据
///   `kind()` 自行判断。
#[derive(Debug, Error)]
#[error("tcp {op} failed: {source}")]
pub struct TransportError {
    op: &'static str,
    #[source]
    source: io::Error,
}

impl TransportError {
    /// 失败的操作标签。
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// 底层 IO 错误类别。
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

pub(crate) fn map_io_error(op: &'static str, source: io::Error) -> TransportError {
    TransportError { op, source }
}
