//! # prism-capture
//!
//! ## 教案目的（Why）
//! - **定位**：面向测试工具的门面层。注入或导入抓包消息，后台转换为切面树，等待完成后用路径查询断言；
//! - **架构角色**：组装 `prism-pipeline` 的管线、`prism-codecs` 的解码插件与本 crate 的配对插件，
//!   并承载配置加载、日志安装与 JSON Lines 抓包读写这些外围能力。
//!
//! ## 交互契约（What）
//! - [`CaptureSession`]：`ingest`/`import` 是单一生产者入口，`wait` 后读取不会看到半成品；
//! - [`PairingPlugin`]：`Correlation` 阶段把响应链接到端点反向、尚未认领的请求；
//! - [`PrismConfig`]：TOML 配置，所有字段有默认值；
//! - [`observability::install`]：安装全局 `tracing` 订阅器，重复安装返回错误。
//!
//! ## 风险提示（Trade-offs）
//! - 配对策略默认取最近的未认领请求；HTTP/1.1 流水线场景应改用 `oldest`。

mod config;
mod error;
mod format;
pub mod observability;
mod pairing;
mod session;

pub use config::{BufferConfig, LoggingConfig, PairingConfig, PrismConfig};
pub use error::CaptureError;
pub use format::{CaptureIdFacet, CaptureRecord, CapturedMessage};
pub use pairing::{PairingPlugin, PairingStrategy};
pub use session::{CaptureSession, ImportSummary};
