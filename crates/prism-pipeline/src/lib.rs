//! `prism-pipeline` 驱动元素树的分阶段富化。
//!
//! # 教案式说明
//! - **意图（Why）**：抓包消息由后台线程逐步解析，而断言代码、界面可能同时读取；消费者绝不能把半成品当成最终结果。
//!   本 crate 提供有序的插件注册表、转换执行器，以及“等待本消息完成 / 等待之前全部消息完成”两个等待原语。
//! - **逻辑（How）**：
//!   - [`PluginRegistry`]：`(阶段, 优先级降序, 注册顺序)` 全序，封存时校验 `follows()` 依赖；
//!   - [`ConversionExecutor`]：按序执行激活的插件，吸收单个插件的失败；
//!   - [`MessageHistory`]：到达顺序的消息历史，每条消息挂 [`ParsingIncompleteFacet`] 与 [`CompletionLatch`]；
//!   - [`ConversionPipeline`]：到达队列 + 工作线程 + 优雅/中断关闭。
//! - **契约（What）**：等待原语在本层没有隐式超时，调用方以 `Some(Duration)` 自行设定期限，
//!   超时为 [`prism_core::CoreError::Timeout`]，中断关闭为 [`prism_core::CoreError::Cancelled`]。

mod executor;
mod history;
mod latch;
mod marker;
mod phase;
mod pipeline;
mod plugin;
mod registry;

pub use executor::ConversionExecutor;
pub use history::MessageHistory;
pub use latch::{CompletionLatch, LatchState};
pub use marker::ParsingIncompleteFacet;
pub use phase::Phase;
pub use pipeline::{ConversionPipeline, PipelineConfig, ShutdownMode};
pub use plugin::ConversionPlugin;
pub use registry::{PluginRegistry, Registration};
