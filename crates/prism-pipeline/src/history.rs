//! 消息历史：按到达顺序记录顶层消息及其完成闩。
//!
//! # 契约说明（What）
//! - 历史顺序恒为到达顺序，与各消息完成转换的先后无关；
//! - “元素 N 已完成”并不蕴含“N 之前的元素都已完成”，需要后者的消费者必须调用
//!   [`MessageHistory::wait_until_all_earlier_parsed`]；
//! - 子元素随其顶层消息一起完成，因此对子元素的等待会转到其所在的顶层消息上。

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use prism_core::{CoreError, Element, ElementId};
use tracing::debug;

use crate::{CompletionLatch, LatchState, ParsingIncompleteFacet};

struct HistoryEntry {
    element: Arc<Element>,
    latch: Arc<CompletionLatch>,
}

#[derive(Default)]
struct HistoryState {
    entries: Vec<HistoryEntry>,
    positions: HashMap<ElementId, usize>,
}

#[derive(Default)]
pub struct MessageHistory {
    state: RwLock<HistoryState>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一条到达的消息并挂上在途标记，返回其完成闩。
    ///
    /// 同一元素重复记录时返回已有的闩，不会产生第二条历史。
    pub fn record(&self, element: &Arc<Element>) -> Arc<CompletionLatch> {
        self.insert(element).0
    }

    /// 记录一条新消息；已在历史中时返回 [`CoreError::AlreadySubmitted`]，既有的闩与切面保持不变。
    pub fn record_new(&self, element: &Arc<Element>) -> Result<Arc<CompletionLatch>, CoreError> {
        match self.insert(element) {
            (latch, true) => Ok(latch),
            (_, false) => Err(CoreError::AlreadySubmitted { element: element.id() }),
        }
    }

    fn insert(&self, element: &Arc<Element>) -> (Arc<CompletionLatch>, bool) {
        let latch = {
            let mut state = self.state.write();
            if let Some(&position) = state.positions.get(&element.id()) {
                return (Arc::clone(&state.entries[position].latch), false);
            }
            let latch = Arc::new(CompletionLatch::new(element.id()));
            let position = state.entries.len();
            state.positions.insert(element.id(), position);
            state.entries.push(HistoryEntry {
                element: Arc::clone(element),
                latch: Arc::clone(&latch),
            });
            latch
        };
        element.add_facet(ParsingIncompleteFacet::new(Arc::clone(&latch)));
        (latch, true)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// 按到达顺序的消息快照。
    pub fn messages(&self) -> Vec<Arc<Element>> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.element))
            .collect()
    }

    pub fn position(&self, id: ElementId) -> Option<usize> {
        self.state.read().positions.get(&id).copied()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.position(id).is_some()
    }

    pub fn latch_of(&self, id: ElementId) -> Option<Arc<CompletionLatch>> {
        let state = self.state.read();
        let position = *state.positions.get(&id)?;
        Some(Arc::clone(&state.entries[position].latch))
    }

    /// `element`（或其顶层消息）之前到达的全部消息，按到达顺序。
    pub fn earlier_than(&self, element: &Element) -> Vec<Arc<Element>> {
        let id = message_id(element);
        let state = self.state.read();
        let end = state.positions.get(&id).copied().unwrap_or(state.entries.len());
        state.entries[..end]
            .iter()
            .map(|entry| Arc::clone(&entry.element))
            .collect()
    }

    /// 等待 `element` 所在的顶层消息完成全部阶段。
    ///
    /// 从未进入历史的元素没有在途标记，视为已完成。
    pub fn wait_until_parsed(&self, element: &Element, timeout: Option<Duration>) -> Result<(), CoreError> {
        match self.latch_of(message_id(element)) {
            Some(latch) => latch.wait(timeout),
            None => Ok(()),
        }
    }

    /// 等待 `element` 之前到达的每一条消息完成全部阶段；期限覆盖整个等待过程。
    pub fn wait_until_all_earlier_parsed(
        &self,
        element: &Element,
        timeout: Option<Duration>,
    ) -> Result<(), CoreError> {
        let id = message_id(element);
        let latches: Vec<Arc<CompletionLatch>> = {
            let state = self.state.read();
            let end = state.positions.get(&id).copied().unwrap_or(state.entries.len());
            state.entries[..end]
                .iter()
                .map(|entry| Arc::clone(&entry.latch))
                .collect()
        };
        wait_all(&latches, timeout)
    }

    /// 等待调用时已记录的每一条消息完成全部阶段；期限覆盖整个等待过程。
    pub fn wait_until_all_parsed(&self, timeout: Option<Duration>) -> Result<(), CoreError> {
        let latches: Vec<Arc<CompletionLatch>> = self
            .state
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.latch))
            .collect();
        wait_all(&latches, timeout)
    }

    /// 取消所有尚未完成的闩，返回被取消的数量。
    pub fn cancel_pending(&self) -> usize {
        let cancelled = self
            .state
            .read()
            .entries
            .iter()
            .filter(|entry| entry.latch.cancel())
            .count();
        if cancelled > 0 {
            debug!(cancelled, "pending messages cancelled");
        }
        cancelled
    }

    /// 仍在途的消息数量。
    pub fn pending(&self) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|entry| entry.latch.state() == LatchState::Pending)
            .count()
    }
}

/// 依次等待每个闩，所有等待共用同一个截止时间。
fn wait_all(latches: &[Arc<CompletionLatch>], timeout: Option<Duration>) -> Result<(), CoreError> {
    let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));
    for latch in latches {
        latch.wait_until(deadline)?;
    }
    Ok(())
}

fn message_id(element: &Element) -> ElementId {
    element
        .root()
        .map(|root| root.id())
        .unwrap_or_else(|| element.id())
}
