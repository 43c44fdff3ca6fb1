//! # prism-codecs
//!
//! ## 教案目的（Why）
//! - **定位**：提供两个参考解码插件，把原始抓包字节变成可查询的切面树：
//!   `StructuralParse` 阶段的 HTTP/1.x 分帧，以及 `ContentEnrichment` 阶段的 JSON 正文富化；
//! - **架构角色**：它们同时充当插件契约的活体示例，端到端测试借助它们验证分阶段、等待与配对语义。
//!
//! ## 交互契约（What）
//! - 所有子元素都是父元素字节的零拷贝切片，解码得到的标量额外挂在 [`prism_core::facets::ValueFacet`] 上；
//! - 无法识别的输入让插件保持未激活；结构损坏的输入以 [`prism_core::CoreError::Plugin`] 报告，
//!   由执行器记录并跳过，消息仍以“部分理解”的状态继续后续阶段。
//!
//! ## 实现策略（How）
//! - `http`：定位 `\r\n\r\n`，解析起始行、头部与请求目标；
//! - `json`：借助 `serde_json::value::RawValue` 取得每个值在正文中的原始区间，逐层建树。
//!
//! ## 风险提示（Trade-offs）
//! - 不处理 `Transfer-Encoding: chunked` 与压缩正文，这些属于传输解包插件的职责；
//! - 头部按 ISO-8859-1 解码，以兼容历史实现中的非 ASCII 头部取值。

mod http;
mod json;

use std::sync::Arc;

use prism_core::CoreError;
use prism_pipeline::PluginRegistry;

pub use http::HttpFramingPlugin;
pub use json::JsonBodyPlugin;

/// 向注册表登记本 crate 的全部插件。
pub fn register_defaults(registry: &PluginRegistry) -> Result<(), CoreError> {
    registry.register(Arc::new(HttpFramingPlugin))?;
    registry.register(Arc::new(JsonBodyPlugin))?;
    Ok(())
}
