use crate::{
    ProxyChannel,
    error::{self, TransportError, map_io_error},
};
use std::net::SocketAddr;
use tokio::net::TcpListener as TokioTcpListener;

/// 对 Tokio `TcpListener` 的语义封装。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 在不暴露 Tokio 具体类型的前提下，提供“监听 → 接受连接”的最小能力，
///   让代理的接入层以 [`ProxyChannel`] 统一管理连接生命周期。
///
/// ## 逻辑 (How)
/// - `bind`：绑定给定地址并记录实际生效的本地地址（便于测试使用端口 0）；
/// - `accept`：接受入站连接并包装为 [`ProxyChannel`]。
///
/// ## 契约 (What)
/// - **前置条件**：调用方必须在 Tokio 运行时中使用该监听器；
/// - **后置条件**：`accept` 成功返回的 [`ProxyChannel`] 已携带本地/对端
///   地址，并准备好进行读写；
/// - **错误语义**：绑定/接受失败时返回带操作标签的 [`TransportError`]。
#[derive(Debug)]
pub struct ProxyListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
}

impl ProxyListener {
    /// 绑定到指定地址并返回监听器。
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TokioTcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        Ok(Self {
            inner: listener,
            local_addr,
        })
    }

    /// 返回监听器实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接受一个入站连接。
    pub async fn accept(&self) -> Result<(ProxyChannel, SocketAddr), TransportError> {
        let (stream, peer_addr) = self
            .inner
            .accept()
            .await
            .map_err(|err| map_io_error(error::ACCEPT, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::ACCEPT, err))?;
        tracing::trace!(%peer_addr, "inbound connection accepted");
        Ok((ProxyChannel::from_parts(stream, local_addr, peer_addr), peer_addr))
    }
}
