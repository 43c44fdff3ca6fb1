use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use prism_core::{CoreError, ElementId};

/// 元素解析状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchState {
    Pending,
    Done,
    Cancelled,
}

/// 一次性的完成闩：`Pending` 只能转入 `Done` 或 `Cancelled`，之后不再变化。
///
/// # 教案式说明
/// - **意图 (Why)**：消费者等待的是“完成信号”而不是固定超时；中断关闭时等待者必须看到取消，而不是永久挂起；
/// - **契约 (What)**：`wait` 在 `Done` 时返回 `Ok(())`，`Cancelled` 时返回 [`CoreError::Cancelled`]，
///   给定期限内仍为 `Pending` 时返回 [`CoreError::Timeout`]；`None` 表示无限等待；
/// - **风险 (Trade-offs)**：`parking_lot::Condvar` 不会虚假唤醒到错误状态，但仍以循环检查状态。
#[derive(Debug)]
pub struct CompletionLatch {
    element: ElementId,
    state: Mutex<LatchState>,
    changed: Condvar,
}

impl CompletionLatch {
    pub fn new(element: ElementId) -> Self {
        Self {
            element,
            state: Mutex::new(LatchState::Pending),
            changed: Condvar::new(),
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn state(&self) -> LatchState {
        *self.state.lock()
    }

    /// 标记完成；已完成或已取消时不产生效果。返回本次调用是否改变了状态。
    pub fn complete(&self) -> bool {
        self.transition(LatchState::Done)
    }

    /// 标记取消；已完成或已取消时不产生效果。
    pub fn cancel(&self) -> bool {
        self.transition(LatchState::Cancelled)
    }

    fn transition(&self, next: LatchState) -> bool {
        let mut state = self.state.lock();
        if *state != LatchState::Pending {
            return false;
        }
        *state = next;
        self.changed.notify_all();
        true
    }

    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), CoreError> {
        self.wait_until(timeout.map(|timeout| (Instant::now() + timeout, timeout)))
    }

    /// 以绝对截止时间等待；`waited` 仅用于错误信息。
    pub(crate) fn wait_until(&self, deadline: Option<(Instant, Duration)>) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        loop {
            match *state {
                LatchState::Done => return Ok(()),
                LatchState::Cancelled => return Err(CoreError::Cancelled { element: self.element }),
                LatchState::Pending => {}
            }
            match deadline {
                None => self.changed.wait(&mut state),
                Some((deadline, waited)) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out()
                        && *state == LatchState::Pending
                    {
                        return Err(CoreError::Timeout {
                            element: self.element,
                            waited,
                        });
                    }
                }
            }
        }
    }
}
