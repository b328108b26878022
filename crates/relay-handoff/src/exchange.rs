//! # 交换上下文模型（Exchange）
//!
//! ## 核心意图（Why）
//! - 建模一次在途的 HTTP 请求/响应对中与连接移交相关的全部状态：
//!   响应状态码、事件流标记、带外属性表与跨次调用复用的升级状态槽；
//! - 槽位采用显式类型（[`UpgradeState`] 的 `Arc`）而非无类型对象，
//!   消除向下转型，复用与否可通过指针同一性直接观测。
//!
//! ## 架构定位（Where）
//! - `Exchange` 由传输层拥有，本 crate 只读取属性与状态码，并在首次
//!   移交尝试时填充升级状态槽；
//! - 属性表用于传递内部带外信号，例如“该交换运行在多路复用传输上”。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU32, Ordering},
};

/// 带外属性的保留键名。
pub mod keys {
    /// 标记交换运行在多路复用传输（HTTP/2）之上，裸套接字接管无意义。
    pub const MULTIPLEXED: &str = "relay.h2";
}

/// 带外属性值。
///
/// - **契约 (What)**：目前仅需要布尔开关与文本两类；访问器在类型不匹配
///   时返回 `None`，调用方自行决定缺省语义。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    /// 以布尔视图读取属性值。
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            PropertyValue::Text(_) => None,
        }
    }

    /// 以文本视图读取属性值。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => Some(value),
            PropertyValue::Bool(_) => None,
        }
    }
}

/// 一次在途 HTTP 交换中与连接移交相关的状态。
///
/// # 教案式说明
/// - **意图 (Why)**：集中承载判定“是否移交”所需的元数据，使策略函数
///   保持纯函数形态；
/// - **契约 (What)**：
///   - `status_code`：响应状态码，响应尚未写出或缺失时为 `None`；
///   - `event_stream`：由响应解析器设置的开放式事件流标记；
///   - `properties`：字符串键的带外属性表，未设置的键按“无信号”处理；
///   - `upgrade_state`：跨次移交尝试复用的类型化状态槽；
/// - **风险 (Trade-offs)**：`Default` 产生的交换缺少状态码，按设计不具
///   备移交资格，不会被误判为升级。
#[derive(Debug, Default)]
pub struct Exchange {
    status_code: Option<u16>,
    event_stream: bool,
    properties: HashMap<String, PropertyValue>,
    upgrade_state: Option<Arc<UpgradeState>>,
}

impl Exchange {
    /// 构造空白交换。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录响应状态码。
    pub fn set_status_code(&mut self, code: u16) {
        self.status_code = Some(code);
    }

    /// 响应状态码，尚未写出响应时为 `None`。
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// 将响应标记为开放式事件流。
    pub fn mark_event_stream(&mut self) {
        self.event_stream = true;
    }

    /// 响应是否为开放式事件流。
    pub fn is_event_stream(&self) -> bool {
        self.event_stream
    }

    /// 写入带外属性，同键覆盖旧值。
    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    /// 读取带外属性。
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// 以布尔语义读取带外属性；未设置或类型不符均视为 `false`。
    pub fn property_bool(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    /// 读取升级状态槽。
    pub fn upgrade_state(&self) -> Option<&Arc<UpgradeState>> {
        self.upgrade_state.as_ref()
    }

    /// 填充升级状态槽，覆盖旧值。
    pub fn set_upgrade_state(&mut self, state: Arc<UpgradeState>) {
        self.upgrade_state = Some(state);
    }
}

/// 跨次移交尝试复用的升级状态。
///
/// # 教案式说明
/// - **意图 (Why)**：同一交换可能在重试中被多次提交给调度器，扩展在
///   首次尝试中建立的协议状态不应被重建；以 `Arc` 共享后，复用与否可
///   通过 [`Arc::ptr_eq`] 验证；
/// - **契约 (What)**：
///   - `peer_addr`：移交时刻连接的对端地址；
///   - `offers`：该状态经历的移交尝试次数，由调度器递增；
///   - `protocol`：扩展接管后可写入一次的协议标注（如 `"websocket"`）；
/// - **风险 (Trade-offs)**：状态只携带元数据而不持有套接字——所有权
///   语义下套接字由适配器独占，接管后整体转移给扩展。
#[derive(Debug)]
pub struct UpgradeState {
    peer_addr: SocketAddr,
    offers: AtomicU32,
    protocol: OnceLock<String>,
}

impl UpgradeState {
    pub(crate) fn new(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            offers: AtomicU32::new(0),
            protocol: OnceLock::new(),
        }
    }

    /// 移交时刻连接的对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub(crate) fn record_offer(&self) -> u32 {
        self.offers.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 该状态经历的移交尝试次数。
    pub fn offers(&self) -> u32 {
        self.offers.load(Ordering::Relaxed)
    }

    /// 写入协议标注；仅首次写入生效，返回是否写入成功。
    pub fn set_protocol(&self, protocol: impl Into<String>) -> bool {
        self.protocol.set(protocol.into()).is_ok()
    }

    /// 读取协议标注。
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.get().map(String::as_str)
    }
}
