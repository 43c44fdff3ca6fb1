use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use prism_core::{CoreError, Element, ElementArena};
use tracing::{debug, warn};

use crate::{ConversionPlugin, MessageHistory, PluginRegistry};

/// 插件观察到的执行器句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：插件只拿到元素与这个句柄：通过它创建子元素（仓库）、递归转换子元素、
///   或显式等待其他消息完成；
/// - **契约 (What)**：[`ConversionExecutor::convert`] 在调用线程上按注册表顺序执行所有激活的插件；
///   插件返回错误或 panic 时记录 `warn` 日志并跳过该插件，其余插件照常执行；
/// - **风险 (Trade-offs)**：`catch_unwind` 捕获 panic 后元素可能带着部分切面继续，这正是“部分理解优于完全看不见”的取舍。
pub struct ConversionExecutor {
    plugins: Vec<Arc<dyn ConversionPlugin>>,
    arena: Arc<ElementArena>,
    history: Arc<MessageHistory>,
}

impl ConversionExecutor {
    /// 以注册表当前的插件顺序构造；注册表应已封存。
    pub fn new(registry: &PluginRegistry, arena: Arc<ElementArena>, history: Arc<MessageHistory>) -> Self {
        Self {
            plugins: registry.plugins(),
            arena,
            history,
        }
    }

    pub fn arena(&self) -> &Arc<ElementArena> {
        &self.arena
    }

    pub fn history(&self) -> &Arc<MessageHistory> {
        &self.history
    }

    /// 对 `element` 依次执行每个阶段中所有激活的插件。
    pub fn convert(&self, element: &Arc<Element>) {
        for plugin in &self.plugins {
            if !plugin.is_active(element) {
                continue;
            }
            debug!(
                element = %element.id(),
                plugin = plugin.name(),
                phase = %plugin.phase(),
                "running conversion plugin"
            );
            match catch_unwind(AssertUnwindSafe(|| plugin.consume(element, self))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(
                    element = %element.id(),
                    plugin = plugin.name(),
                    code = error.code(),
                    %error,
                    "conversion plugin failed; skipping it for this element"
                ),
                Err(payload) => warn!(
                    element = %element.id(),
                    plugin = plugin.name(),
                    panic = panic_message(payload.as_ref()),
                    "conversion plugin panicked; skipping it for this element"
                ),
            }
        }
    }

    pub fn wait_until_parsed(&self, element: &Element, timeout: Option<Duration>) -> Result<(), CoreError> {
        self.history.wait_until_parsed(element, timeout)
    }

    pub fn wait_until_all_earlier_parsed(
        &self,
        element: &Element,
        timeout: Option<Duration>,
    ) -> Result<(), CoreError> {
        self.history.wait_until_all_earlier_parsed(element, timeout)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
