//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为移交核心内部的可恢复故障提供集中定义；按设计（见 crate 文档），
//!   这些故障不会穿透到调用方——对外只暴露二元移交结果，错误仅用于
//!   内部分流与日志。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error` 以兼容 `std::error::Error`；
//! - 扩展监听器以 [`HandoffError`] 描述失败原因，调度器据此记录日志
//!   并继续扫描下一个监听器。

use std::io;

use thiserror::Error;

/// 移交核心的内部错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“适配阶段失败”（连接无法进入阻塞视图）与
///   “监听器自身失败”（视同放弃接管），两者的处置路径不同；
/// - **契约 (What)**：所有变体均满足 `Send + Sync + 'static`，可安全
///   跨线程传播；
/// - **风险 (Trade-offs)**：`detail` 使用 `String` 保存上下文，牺牲少量
///   堆分配换取日志可读性。
#[derive(Debug, Error)]
pub enum HandoffError {
    /// 将拆解出的流转换为阻塞视图失败。
    ///
    /// - **契约 (What)**：出现于 `into_std` 或阻塞模式切换等不可恢复
    ///   环节；读半部获取失败不属于此类（降级为只写适配器）。
    #[error("failed to adapt detached stream into a blocking view: {source}")]
    Adapt {
        #[source]
        source: io::Error,
    },

    /// 监听器在接管尝试中报告失败。
    ///
    /// - **契约 (What)**：`listener` 为监听器名称，`detail` 为人类可读
    ///   说明；调度器将其视同放弃接管，继续扫描后续监听器。
    #[error("listener `{listener}` failed during takeover attempt: {detail}")]
    ListenerFailure { listener: String, detail: String },
}
