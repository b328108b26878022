use crate::error::{self, TransportError, map_io_error};
use bytes::{Buf, Bytes, BytesMut};
use socket2::SockRef;
use std::{
    io,
    net::{Shutdown as StdShutdown, SocketAddr},
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream as TokioTcpStream,
    sync::Mutex as AsyncMutex,
};

#[derive(Debug)]
struct ProxyChannelInner {
    stream: AsyncMutex<TokioTcpStream>,
    unread: Mutex<BytesMut>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

/// 代理事件驱动侧使用的 TCP 通道，封装读写、半关闭与“已读回退”缓冲。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为 HTTP 解码器提供对单个 TCP 连接的直接控制，同时允许解码器把
///   从套接字多读出的字节退回通道，保证后续消费方（无论继续走 HTTP
///   还是被移交给扩展协议）看到的字节序列与线路一致；
/// - 在不暴露 Tokio 具体类型的前提下，完成字节流读写与半关闭。
///
/// ## 逻辑 (How)
/// - 内部以 `tokio::sync::Mutex` 包裹 `TcpStream`，确保多线程调用 `&self`
///   方法时的互斥；
/// - `read` 先排空回退缓冲，再触碰套接字，因此回退字节总是先于线上
///   新字节被观察到；
/// - `try_into_parts` 在唯一持有者场景下拆解出裸 `TcpStream` 与剩余
///   回退字节，供协议移交路径构造阻塞视图。
///
/// ## 契约 (What)
/// - `connect`：建立到目标地址的连接；
/// - `read`/`write`：执行一次 IO 操作，返回实际读写字节数；
/// - `unread`：按流序追加解码器多读出的字节；
/// - `shutdown`：执行半关闭；
/// - `peer_addr`/`local_addr`：提供地址元数据。
///
/// ## 注意事项 (Trade-offs)
/// - 互斥锁序列化读写，不支持真正的全双工；代理的每连接单任务模型
///   下不构成瓶颈；
/// - 回退缓冲无容量上限，依赖解码器只退回单个报文的残余字节。
#[derive(Clone, Debug)]
pub struct ProxyChannel {
    inner: Arc<ProxyChannelInner>,
}

/// 将通道拆解为裸 `TcpStream`、剩余回退字节与地址元数据的结果结构。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协议移交（WebSocket、SSE 等）需要直接控制底层 `TcpStream`，通过
///   本结构可在保持连接连续性的同时交由阻塞适配层驱动；
/// - `unread` 保留事件驱动层已收到但尚未交付应用的字节，移交后必须
///   作为最先被读到的内容，避免丢字节。
///
/// ## 契约（What）
/// - `stream`：原始 Tokio `TcpStream`；
/// - `unread`：按流序排列的待消费字节，可能为空；
/// - **前置条件**：调用方已经放弃对原 [`ProxyChannel`] 的其他克隆；
/// - **后置条件**：所有权完全转移至该结构体，由上层决定后续处理方式。
#[derive(Debug)]
pub struct ChannelParts {
    pub stream: TokioTcpStream,
    pub unread: Bytes,
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

impl ProxyChannel {
    pub(crate) fn from_parts(
        stream: TokioTcpStream,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyChannelInner {
                stream: AsyncMutex::new(stream),
                unread: Mutex::new(BytesMut::new()),
                peer_addr,
                local_addr,
            }),
        }
    }

    /// 建立到目标地址的连接。
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TokioTcpStream::connect(addr)
            .await
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let local = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        let peer = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONNECT, err))?;
        Ok(Self::from_parts(stream, local, peer))
    }

    /// 读取数据到缓冲区，回退字节优先于套接字新字节。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        {
            let mut unread = lock_unread(&self.inner.unread);
            if !unread.is_empty() {
                let n = unread.len().min(buf.len());
                buf[..n].copy_from_slice(&unread[..n]);
                unread.advance(n);
                return Ok(n);
            }
        }
        let mut guard = self.inner.stream.lock().await;
        guard
            .read(buf)
            .await
            .map_err(|err| map_io_error(error::READ, err))
    }

    /// 将整个缓冲区写入套接字。
    pub async fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut guard = self.inner.stream.lock().await;
        guard
            .write_all(buf)
            .await
            .map(|_| buf.len())
            .map_err(|err| map_io_error(error::WRITE, err))
    }

    /// 按流序追加解码器多读出的字节。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：HTTP 解码器为了定位报文边界常会从套接字多读出
    ///   若干字节，这些字节逻辑上仍属于“尚未交付”的线上数据；
    /// - **契约 (What)**：同一连接上按接收顺序调用，缓冲内部保持流序；
    ///   之后的 [`read`](Self::read) 与 [`try_into_parts`](Self::try_into_parts)
    ///   都会最先观察到这些字节；
    /// - **前置条件**：`bytes` 必须是刚从本通道读出且未被消费的内容，
    ///   退回其他来源的数据会破坏字节序一致性。
    pub fn unread(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut unread = lock_unread(&self.inner.unread);
        unread.extend_from_slice(bytes);
        tracing::trace!(len = bytes.len(), "bytes pushed back to channel");
    }

    /// 根据方向执行半关闭。
    pub async fn shutdown(&self, direction: ShutdownDirection) -> Result<(), TransportError> {
        let mut guard = self.inner.stream.lock().await;
        let result = match direction {
            ShutdownDirection::Write => AsyncWriteExt::shutdown(&mut *guard).await,
            ShutdownDirection::Read => sync_shutdown(&guard, StdShutdown::Read),
            ShutdownDirection::Both => match AsyncWriteExt::shutdown(&mut *guard).await {
                Ok(()) => sync_shutdown(&guard, StdShutdown::Read),
                Err(err) => Err(err),
            },
        };
        result.map_err(|err| map_io_error(error::SHUTDOWN, err))
    }

    /// 获取对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// 获取本地地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// 将通道尝试拆解为 [`ChannelParts`]。
    ///
    /// # 教案级注释
    ///
    /// ## 意图（Why）
    /// - 协议移交阶段需要直接操作底层 `TcpStream`，通过本方法可在保持
    ///   连接连续性的同时交由阻塞适配层驱动；
    /// - 若拆解失败（例如通道已被克隆），返回原始 [`ProxyChannel`]，
    ///   调用方可决定是否放弃移交，避免出现“半拆解”导致的资源泄露。
    ///
    /// ## 逻辑（How）
    /// - 使用 `Arc::try_unwrap` 检查是否存在唯一所有者；
    /// - 成功时取出 `TcpStream` 与剩余回退字节，冻结为 `Bytes` 一并返回。
    ///
    /// ## 契约（What）
    /// - 返回 `Ok(parts)` 表示拆解成功，原通道不再可用；
    /// - 返回 `Err(self)` 表示仍有其他持有者，通道可继续照常使用；
    /// - **前置条件**：调用方必须确保没有未完成的读写操作。
    pub fn try_into_parts(self) -> Result<ChannelParts, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let stream = inner.stream.into_inner();
                let unread = match inner.unread.into_inner() {
                    Ok(buf) => buf,
                    Err(poisoned) => poisoned.into_inner(),
                };
                Ok(ChannelParts {
                    stream,
                    unread: unread.freeze(),
                    local_addr: inner.local_addr,
                    peer_addr: inner.peer_addr,
                })
            }
            Err(inner) => Err(Self { inner }),
        }
    }
}

/// 表示半关闭的方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownDirection {
    /// 关闭写半部。
    Write,
    /// 关闭读半部。
    Read,
    /// 同时关闭读写半部。
    Both,
}

impl From<ShutdownDirection> for StdShutdown {
    fn from(value: ShutdownDirection) -> Self {
        match value {
            ShutdownDirection::Write => StdShutdown::Write,
            ShutdownDirection::Read => StdShutdown::Read,
            ShutdownDirection::Both => StdShutdown::Both,
        }
    }
}

fn lock_unread(unread: &Mutex<BytesMut>) -> std::sync::MutexGuard<'_, BytesMut> {
    match unread.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn sync_shutdown(stream: &TokioTcpStream, direction: StdShutdown) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.shutdown(direction)
}
