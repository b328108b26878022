//! # 阻塞连接适配器（ConnectionAdapter）
//!
//! ## 核心意图（Why）
//! - 代理的主传输是事件驱动的，而希望接管连接的协议扩展（隧道、双工、
//!   协议翻译）期望传统的阻塞套接字接口；本模块把拆解出的通道部件
//!   翻译为阻塞读写视图，跨越这道架构边界；
//! - 事件驱动层已缓冲但尚未交付的字节必须成为适配器读出的最前缀，
//!   否则移交会静默丢数据。
//!
//! ## 架构定位（Where）
//! - 输入是 [`ChannelParts`]——通道在唯一持有者场景下拆解出的裸流、
//!   剩余回退字节与地址元数据；
//! - 适配器在移交尝试期间独占连接；接管成功后整体转移给扩展，未被
//!   接管则交还调用方，由其关闭恰好一次（RAII 丢弃即关闭）。

use crate::error::HandoffError;
use bytes::{Buf, Bytes};
use relay_transport_tcp::ChannelParts;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream as StdTcpStream};

/// 事件驱动通道之上的阻塞套接字视图。
///
/// # 教案式说明
/// - **意图 (Why)**：让只会阻塞 IO 的扩展监听器直接消费代理连接，
///   无需感知事件循环的存在；
/// - **契约 (What)**：
///   - 视图复用同一传输资源，不建立新的网络连接；
///   - 构造本身不触发任何读写，只有显式的 `read`/`write` 才做 IO；
///   - 读操作先逐字节排空回退前缀，再进入实时套接字，无丢失无重复；
///   - 读半部获取失败时适配器仍然返回，降级为只写——部分监听器只需
///     写出（例如推送关闭帧），对能力受限的连接是容忍的；
/// - **风险 (Trade-offs)**：读写均为阻塞调用，必须运行在专用工作线程
///   而非事件循环线程上（由调度侧保证）。
#[derive(Debug)]
pub struct ConnectionAdapter {
    prefix: Bytes,
    stream: StdTcpStream,
    reader: Option<StdTcpStream>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl ConnectionAdapter {
    /// 将拆解出的通道部件适配为阻塞视图。
    ///
    /// # 教案式注释
    /// - **逻辑 (How)**：`into_std` 取回标准库流并切回阻塞模式；读半部
    ///   通过 `try_clone` 获取独立句柄，失败则记录告警并降级为只写；
    /// - **契约 (What)**：
    ///   - **前置条件**：`parts` 来自
    ///     [`ProxyChannel::try_into_parts`](relay_transport_tcp::ProxyChannel::try_into_parts)，
    ///     事件循环已不再触碰该流；
    ///   - **后置条件**：适配器独占连接；`parts.unread` 成为读出的最前缀；
    ///   - **错误**：`into_std` 或阻塞模式切换失败返回
    ///     [`HandoffError::Adapt`]，此时流随错误路径丢弃、连接关闭。
    pub fn adapt(parts: ChannelParts) -> Result<Self, HandoffError> {
        let stream = parts
            .stream
            .into_std()
            .map_err(|source| HandoffError::Adapt { source })?;
        stream
            .set_nonblocking(false)
            .map_err(|source| HandoffError::Adapt { source })?;
        let reader = match stream.try_clone() {
            Ok(clone) => Some(clone),
            Err(err) => {
                tracing::warn!(
                    peer_addr = %parts.peer_addr,
                    error = %err,
                    "read half unavailable, adapter degraded to write-only"
                );
                None
            }
        };
        Ok(Self {
            prefix: parts.unread,
            stream,
            reader,
            peer_addr: parts.peer_addr,
            local_addr: parts.local_addr,
        })
    }

    #[cfg(test)]
    pub(crate) fn over_stream(stream: StdTcpStream, prefix: Bytes) -> Self {
        let peer_addr = stream.peer_addr().expect("测试流应携带对端地址");
        let local_addr = stream.local_addr().expect("测试流应携带本地地址");
        let reader = stream.try_clone().ok();
        Self {
            prefix,
            stream,
            reader,
            peer_addr,
            local_addr,
        }
    }

    #[cfg(test)]
    pub(crate) fn write_only_over_stream(stream: StdTcpStream) -> Self {
        let peer_addr = stream.peer_addr().expect("测试流应携带对端地址");
        let local_addr = stream.local_addr().expect("测试流应携带本地地址");
        Self {
            prefix: Bytes::new(),
            stream,
            reader: None,
            peer_addr,
            local_addr,
        }
    }

    /// 适配器是否具备读能力；`false` 表示降级为只写。
    pub fn can_read(&self) -> bool {
        self.reader.is_some() || !self.prefix.is_empty()
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 本地地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 尽力而为的双向关闭；丢弃适配器同样会关闭连接。
    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

impl Read for ConnectionAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Ok(n);
        }
        match self.reader.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "adapter read half unavailable",
            )),
        }
    }
}

impl Write for ConnectionAdapter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
