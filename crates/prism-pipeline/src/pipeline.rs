//! 转换管线：到达队列、工作线程与关闭语义。
//!
//! # 设计背景（Why）
//! - 单一生产者（抓包传输或导入）按到达顺序提交消息，N 个工作线程并行转换互不相关的消息；
//! - 同一消息内的插件严格串行；跨消息的依赖只能通过等待原语表达。
//!
//! # 契约说明（What）
//! - [`ConversionPipeline::submit`] 先记录历史（到达顺序、在途标记），再入队；
//! - 一条消息的全部阶段结束后移除在途标记，从而完成其闩；
//! - [`ShutdownMode::Graceful`] 处理完队列中剩余的消息后退出；[`ShutdownMode::Interrupt`] 丢弃未开始的消息，
//!   取消所有未完成的闩，等待者观察到 [`CoreError::Cancelled`]；正在执行的插件不会被强行终止。

use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use prism_core::{CoreError, Element, ElementArena};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConversionExecutor, MessageHistory, ParsingIncompleteFacet, PluginRegistry};

/// 管线配置，对应配置文件中的 `[pipeline]` 段。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// 工作线程数量，必须至少为 1。
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownMode {
    /// 处理完已入队的消息后退出。
    Graceful,
    /// 丢弃未开始的消息并取消所有在途等待。
    Interrupt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueState {
    Open,
    Draining,
    Interrupted,
}

struct WorkQueue {
    items: Mutex<(VecDeque<Arc<Element>>, QueueState)>,
    available: Condvar,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new((VecDeque::new(), QueueState::Open)),
            available: Condvar::new(),
        }
    }

    /// 阻塞直到取得下一条消息；队列关闭且不再有可处理的消息时返回 `None`。
    fn next(&self) -> Option<Arc<Element>> {
        let mut guard = self.items.lock();
        loop {
            match guard.1 {
                QueueState::Interrupted => return None,
                QueueState::Draining => return guard.0.pop_front(),
                QueueState::Open => {
                    if let Some(element) = guard.0.pop_front() {
                        return Some(element);
                    }
                    self.available.wait(&mut guard);
                }
            }
        }
    }
}

pub struct ConversionPipeline {
    executor: Arc<ConversionExecutor>,
    queue: Arc<WorkQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: PipelineConfig,
}

impl ConversionPipeline {
    /// 封存注册表（若尚未封存）并构造管线；工作线程需另行 [`start_workers`](Self::start_workers)。
    pub fn new(
        registry: Arc<PluginRegistry>,
        arena: Arc<ElementArena>,
        history: Arc<MessageHistory>,
        config: PipelineConfig,
    ) -> Result<Self, CoreError> {
        registry.seal()?;
        Ok(Self {
            executor: Arc::new(ConversionExecutor::new(&registry, arena, history)),
            queue: Arc::new(WorkQueue::new()),
            workers: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<ConversionExecutor> {
        &self.executor
    }

    pub fn history(&self) -> &Arc<MessageHistory> {
        self.executor.history()
    }

    pub fn arena(&self) -> &Arc<ElementArena> {
        self.executor.arena()
    }

    /// 管线是否仍接受新消息。
    pub fn is_accepting(&self) -> bool {
        self.queue.items.lock().1 == QueueState::Open
    }

    /// 提交一条顶层消息。
    ///
    /// 管线已关闭时返回 [`CoreError::Cancelled`]，消息不会进入历史；
    /// 消息已提交或已转换过时返回 [`CoreError::AlreadySubmitted`]。
    pub fn submit(&self, element: Arc<Element>) -> Result<(), CoreError> {
        let mut guard = self.queue.items.lock();
        if guard.1 != QueueState::Open {
            return Err(CoreError::Cancelled { element: element.id() });
        }
        self.history().record_new(&element)?;
        guard.0.push_back(element);
        drop(guard);
        self.queue.available.notify_one();
        Ok(())
    }

    /// 在调用线程上立即转换一条尚未进入历史的消息，返回时该消息已完成。
    ///
    /// 已提交（可能仍在队列中）或已转换过的消息返回 [`CoreError::AlreadySubmitted`]，不会被再次转换。
    pub fn convert_now(&self, element: &Arc<Element>) -> Result<(), CoreError> {
        self.history().record_new(element)?;
        finish(&self.executor, element);
        Ok(())
    }

    /// 启动 `count` 个工作线程；可多次调用以追加线程。
    pub fn start_workers(&self, count: usize) -> io::Result<()> {
        let mut workers = self.workers.lock();
        for _ in 0..count {
            let index = workers.len();
            let queue = Arc::clone(&self.queue);
            let executor = Arc::clone(&self.executor);
            let handle = thread::Builder::new()
                .name(format!("prism-worker-{index}"))
                .spawn(move || {
                    debug!(worker = index, "conversion worker started");
                    while let Some(element) = queue.next() {
                        finish(&executor, &element);
                    }
                    debug!(worker = index, "conversion worker stopped");
                })?;
            workers.push(handle);
        }
        Ok(())
    }

    /// 按配置的数量启动工作线程。
    pub fn start(&self) -> io::Result<()> {
        self.start_workers(self.config.workers)
    }

    /// 关闭管线并回收工作线程；重复调用无副作用。
    pub fn shutdown(&self, mode: ShutdownMode) {
        let (already_closed, leftover) = {
            let mut guard = self.queue.items.lock();
            let already_closed = guard.1 != QueueState::Open;
            if !already_closed {
                guard.1 = match mode {
                    ShutdownMode::Graceful => QueueState::Draining,
                    ShutdownMode::Interrupt => QueueState::Interrupted,
                };
            }
            if guard.1 == QueueState::Interrupted {
                guard.0.clear();
            }
            (already_closed, guard.0.len())
        };
        self.queue.available.notify_all();
        if mode == ShutdownMode::Interrupt {
            self.history().cancel_pending();
        }

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let had_workers = !handles.is_empty();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("conversion worker terminated abnormally");
            }
        }
        // 没有工作线程时，优雅关闭在调用线程上处理剩余消息，避免等待者永久挂起。
        if !had_workers {
            while let Some(element) = self.queue.next() {
                finish(&self.executor, &element);
            }
        }
        if !already_closed {
            info!(?mode, leftover, "conversion pipeline shut down");
        }
    }
}

impl Drop for ConversionPipeline {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Graceful);
    }
}

/// 执行全部阶段，然后移除在途标记以完成闩。
fn finish(executor: &ConversionExecutor, element: &Arc<Element>) {
    executor.convert(element);
    element.remove_facet::<ParsingIncompleteFacet>();
}
