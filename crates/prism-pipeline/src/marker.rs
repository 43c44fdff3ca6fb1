use std::sync::Arc;

use prism_core::{Element, Facet};

use crate::CompletionLatch;

/// 在途标记：元素仍在转换管线中。
///
/// 最后一个阶段结束后由管线移除，移除回调完成对应的 [`CompletionLatch`]，唤醒所有等待者。
#[derive(Debug)]
pub struct ParsingIncompleteFacet {
    latch: Arc<CompletionLatch>,
}

impl ParsingIncompleteFacet {
    pub fn new(latch: Arc<CompletionLatch>) -> Self {
        Self { latch }
    }

    pub fn latch(&self) -> &Arc<CompletionLatch> {
        &self.latch
    }
}

impl Facet for ParsingIncompleteFacet {
    fn name(&self) -> &'static str {
        "parsing_incomplete"
    }

    fn on_removed(&self, element: &Element) {
        if self.latch.complete() {
            tracing::debug!(element = %element.id(), "element parsing completed");
        }
    }
}
