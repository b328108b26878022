//! 端到端移交流程：真实回环套接字上验证“判定 → 拆解 → 适配 → 提交”
//! 的完整链路，以及三个终态对传输层的可见效果。

use relay_handoff::{
    CompletionDirective, Exchange, HandoffDispatcher, PersistentConnectionListener, PropertyValue,
    ProxyHandoff, SWITCHING_PROTOCOLS, Takeover, keys,
};
use relay_transport_tcp::{ProxyChannel, ProxyListener};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn accepted_channel() -> (ProxyChannel, TcpStream) {
    let listener = ProxyListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("监听回环地址应成功");
    let addr = listener.local_addr();
    let (client, served) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (channel, _) = served.expect("接受回环连接应成功");
    (channel, client.expect("回环连接应成功"))
}

fn upgrade_exchange() -> Exchange {
    let mut exchange = Exchange::new();
    exchange.set_status_code(SWITCHING_PROTOCOLS);
    exchange
}

/// 接管连接的最小隧道扩展：读完首个报文后回写确认。
struct TunnelListener {
    seen: Arc<Mutex<Vec<u8>>>,
    expect: usize,
}

impl PersistentConnectionListener for TunnelListener {
    fn name(&self) -> &str {
        "tunnel"
    }

    fn attempt_takeover(
        &self,
        _exchange: &mut Exchange,
        mut conn: relay_handoff::ConnectionAdapter,
        state: &Arc<relay_handoff::UpgradeState>,
    ) -> Takeover {
        state.set_protocol("websocket");
        let mut buf = vec![0u8; self.expect];
        if conn.read_exact(&mut buf).is_err() {
            return Takeover::Declined(conn);
        }
        self.seen.lock().unwrap().extend_from_slice(&buf);
        if conn.write_all(b"ack").is_err() {
            return Takeover::Declined(conn);
        }
        Takeover::Accepted
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upgraded_connection_hands_buffered_then_live_bytes_to_the_listener() {
    let (channel, mut client) = accepted_channel().await;
    // 模拟 HTTP 解码器从套接字多读出的升级后首包前缀。
    channel.unread(b"pre:");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = HandoffDispatcher::new();
    dispatcher.register(Arc::new(TunnelListener {
        seen: Arc::clone(&seen),
        expect: b"pre:frame".len(),
    }));
    let handoff = ProxyHandoff::new(dispatcher);
    let mut exchange = upgrade_exchange();

    let client_task = tokio::spawn(async move {
        client.write_all(b"frame").await.unwrap();
        let mut ack = [0u8; 3];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, b"ack");
    });

    let directive = handoff.post_write_response(&mut exchange, channel).await;
    assert!(directive.remains_open(), "接管成功后连接应保持打开");
    client_task.await.unwrap();

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        b"pre:frame",
        "扩展应先读到回退前缀，再读到线上新字节，无丢失无重复"
    );
    let state = exchange.upgrade_state().expect("移交后状态槽应已填充");
    assert_eq!(state.protocol(), Some("websocket"));
    assert_eq!(state.offers(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_response_returns_the_channel_for_normal_http() {
    let (channel, mut client) = accepted_channel().await;
    let handoff = ProxyHandoff::new(HandoffDispatcher::new());
    let mut exchange = Exchange::new();
    exchange.set_status_code(200);

    match handoff.post_write_response(&mut exchange, channel).await {
        CompletionDirective::ContinueHttp(channel) => {
            // 非升级交换不应消耗通道，HTTP 流水线可继续使用。
            channel.write(b"next").await.unwrap();
            let mut buf = [0u8; 4];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"next");
        }
        other => panic!("普通响应应回归 HTTP 流水线，实际为 {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unclaimed_upgrade_closes_the_connection() {
    let (channel, mut client) = accepted_channel().await;
    let handoff = ProxyHandoff::new(HandoffDispatcher::new());
    let mut exchange = upgrade_exchange();

    let directive = handoff.post_write_response(&mut exchange, channel).await;
    assert!(matches!(directive, CompletionDirective::Close));
    assert!(!directive.remains_open());

    let mut buf = [0u8; 1];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "无人认领时对端应观察到连接关闭");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multiplexed_exchange_never_enters_the_handoff_path() {
    let (channel, _client) = accepted_channel().await;
    let handoff = ProxyHandoff::new(HandoffDispatcher::new());
    let mut exchange = upgrade_exchange();
    exchange.set_property(keys::MULTIPLEXED, PropertyValue::Bool(true));

    match handoff.post_write_response(&mut exchange, channel).await {
        CompletionDirective::ContinueHttp(_) => {}
        other => panic!("复用传输上的 101 不应触发移交，实际为 {other:?}"),
    }
    assert!(
        exchange.upgrade_state().is_none(),
        "未进入移交流程时不应构造升级状态"
    );
}
