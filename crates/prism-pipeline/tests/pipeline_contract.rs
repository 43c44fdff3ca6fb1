//! `pipeline_contract` 集成测试：注册顺序、失败吸收与等待契约。
//!
//! # 测试总览（Why）
//! - 顺序不变式：任意注册顺序下，执行顺序只由 `(阶段, 优先级降序, 注册顺序)` 决定；
//! - 插件失败（返回错误或 panic）只被记录并跳过，后续插件照常执行；
//! - 等待契约：调用“等待之前全部消息完成”之后读取，永远不会因早期阶段插件尚未执行而看到 `MissingFacet`；
//! - 超时与中断关闭分别以 `Timeout`、`Cancelled` 呈现给等待者。

use std::{sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use prism_core::{
    ByteRegion, CoreError, Element, ElementArena,
    facets::{NoteFacet, NoteSeverity, ValueFacet},
};
use prism_pipeline::{
    ConversionExecutor, ConversionPipeline, ConversionPlugin, LatchState, MessageHistory,
    ParsingIncompleteFacet, Phase, PipelineConfig, PluginRegistry, ShutdownMode,
};
use proptest::prelude::*;
use tracing_test::traced_test;

type Journal = Arc<Mutex<Vec<String>>>;

/// 记录执行顺序的插件。
struct Recorder {
    name: String,
    phase: Phase,
    priority: i32,
    journal: Journal,
}

impl ConversionPlugin for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn consume(&self, _: &Arc<Element>, _: &ConversionExecutor) -> Result<(), CoreError> {
        self.journal.lock().push(self.name.clone());
        Ok(())
    }
}

fn pipeline_with(plugins: Vec<Arc<dyn ConversionPlugin>>, workers: usize) -> ConversionPipeline {
    let registry = Arc::new(PluginRegistry::new());
    for plugin in plugins {
        registry.register(plugin).expect("注册成功");
    }
    ConversionPipeline::new(
        registry,
        ElementArena::new(),
        Arc::new(MessageHistory::new()),
        PipelineConfig { workers },
    )
    .expect("构造管线")
}

proptest! {
    #[test]
    fn execution_order_ignores_registration_order(order in Just(vec![0usize, 1, 2]).prop_shuffle()) {
        let journal: Journal = Arc::default();
        let specs = [
            ("a1", Phase::StructuralParse, 1),
            ("a5", Phase::StructuralParse, 5),
            ("b0", Phase::ContentEnrichment, 0),
        ];
        let plugins: Vec<Arc<dyn ConversionPlugin>> = order
            .iter()
            .map(|&index| {
                let (name, phase, priority) = specs[index];
                Arc::new(Recorder {
                    name: name.to_owned(),
                    phase,
                    priority,
                    journal: Arc::clone(&journal),
                }) as Arc<dyn ConversionPlugin>
            })
            .collect();
        let pipeline = pipeline_with(plugins, 1);
        let message = pipeline.arena().create_root(ByteRegion::from("m"));
        pipeline.convert_now(&message).expect("新消息可转换");
        prop_assert_eq!(journal.lock().clone(), vec!["a5", "a1", "b0"]);
    }
}

struct Failing;

impl ConversionPlugin for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn phase(&self) -> Phase {
        Phase::StructuralParse
    }

    fn priority(&self) -> i32 {
        10
    }

    fn consume(&self, _: &Arc<Element>, _: &ConversionExecutor) -> Result<(), CoreError> {
        Err(CoreError::plugin("failing", "truncated frame"))
    }
}

struct Panicking;

impl ConversionPlugin for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn phase(&self) -> Phase {
        Phase::StructuralParse
    }

    fn priority(&self) -> i32 {
        5
    }

    fn consume(&self, _: &Arc<Element>, _: &ConversionExecutor) -> Result<(), CoreError> {
        panic!("decoder bug");
    }
}

#[test]
#[traced_test]
fn failing_plugins_are_logged_and_skipped() {
    let journal: Journal = Arc::default();
    let survivor = Arc::new(Recorder {
        name: "survivor".to_owned(),
        phase: Phase::ContentEnrichment,
        priority: 0,
        journal: Arc::clone(&journal),
    });
    let plugins: Vec<Arc<dyn ConversionPlugin>> = vec![Arc::new(Failing), Arc::new(Panicking), survivor];
    let pipeline = pipeline_with(plugins, 1);
    let message = pipeline.arena().create_root(ByteRegion::from("m"));
    pipeline.convert_now(&message).expect("新消息可转换");

    assert_eq!(journal.lock().as_slice(), ["survivor"]);
    assert!(!message.has_facet::<ParsingIncompleteFacet>());
    assert!(logs_contain("conversion plugin failed"));
    assert!(logs_contain("truncated frame"));
    assert!(logs_contain("conversion plugin panicked"));
    assert!(logs_contain("decoder bug"));
}

/// 结构阶段：前几条消息故意变慢，再追加值切面。
struct SlowParser;

impl ConversionPlugin for SlowParser {
    fn name(&self) -> &str {
        "slow-parser"
    }

    fn phase(&self) -> Phase {
        Phase::StructuralParse
    }

    fn consume(&self, element: &Arc<Element>, _: &ConversionExecutor) -> Result<(), CoreError> {
        let text = element.raw_string_content();
        if text.as_str() < "m3" {
            thread::sleep(Duration::from_millis(30));
        }
        element.add_facet(ValueFacet::text(text));
        Ok(())
    }
}

/// 关联阶段：等待之前全部消息后读取它们的值切面；读不到就留下错误注释。
struct EarlierReader;

impl ConversionPlugin for EarlierReader {
    fn name(&self) -> &str {
        "earlier-reader"
    }

    fn phase(&self) -> Phase {
        Phase::Correlation
    }

    fn follows(&self) -> &[&'static str] {
        &["slow-parser"]
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError> {
        executor.wait_until_all_earlier_parsed(element, Some(Duration::from_secs(5)))?;
        for earlier in executor.history().earlier_than(element) {
            if let Err(error) = earlier.facet_or_fail::<ValueFacet>() {
                element.add_facet(NoteFacet::new(NoteSeverity::Error, error.to_string()));
            }
        }
        Ok(())
    }
}

#[test]
fn waiting_for_earlier_messages_never_observes_missing_facets() {
    let plugins: Vec<Arc<dyn ConversionPlugin>> = vec![Arc::new(SlowParser), Arc::new(EarlierReader)];
    let pipeline = pipeline_with(plugins, 4);
    pipeline.start().expect("启动工作线程");
    let messages: Vec<Arc<Element>> = (0..8)
        .map(|index| pipeline.arena().create_root(ByteRegion::from(format!("m{index}").into_bytes())))
        .collect();
    for message in &messages {
        pipeline.submit(Arc::clone(message)).expect("管线开放");
    }

    let last = messages.last().expect("至少一条消息");
    pipeline
        .history()
        .wait_until_all_earlier_parsed(last, Some(Duration::from_secs(10)))
        .expect("之前的消息全部完成");
    for earlier in &messages[..messages.len() - 1] {
        earlier.facet_or_fail::<ValueFacet>().expect("等待后早期阶段切面必然存在");
    }
    pipeline.shutdown(ShutdownMode::Graceful);

    for message in &messages {
        assert!(message.facet::<NoteFacet>().is_none(), "{message:?}");
        assert_eq!(
            pipeline.history().latch_of(message.id()).map(|latch| latch.state()),
            Some(LatchState::Done)
        );
    }
    let order: Vec<_> = pipeline.history().messages().iter().map(|m| m.id()).collect();
    assert_eq!(order, messages.iter().map(|m| m.id()).collect::<Vec<_>>());
}

#[test]
fn messages_are_converted_at_most_once() {
    let journal: Journal = Arc::default();
    let counter: Arc<dyn ConversionPlugin> = Arc::new(Recorder {
        name: "counter".to_owned(),
        phase: Phase::StructuralParse,
        priority: 0,
        journal: Arc::clone(&journal),
    });
    let pipeline = pipeline_with(vec![counter], 1);

    let queued = pipeline.arena().create_root(ByteRegion::from("queued"));
    pipeline.submit(Arc::clone(&queued)).expect("管线开放");
    assert_eq!(
        pipeline.convert_now(&queued),
        Err(CoreError::AlreadySubmitted { element: queued.id() })
    );
    assert!(queued.has_facet::<ParsingIncompleteFacet>(), "排队中的消息不会被提前标记完成");
    assert_eq!(
        pipeline.history().latch_of(queued.id()).map(|latch| latch.state()),
        Some(LatchState::Pending)
    );

    let converted = pipeline.arena().create_root(ByteRegion::from("converted"));
    pipeline.convert_now(&converted).expect("新消息可转换");
    let again = pipeline.convert_now(&converted).expect_err("已转换的消息不再转换");
    assert_eq!(again.code(), "pipeline.already_submitted");
    assert_eq!(
        pipeline.submit(Arc::clone(&converted)),
        Err(CoreError::AlreadySubmitted { element: converted.id() })
    );
    assert_eq!(journal.lock().len(), 1);

    pipeline.shutdown(ShutdownMode::Graceful);
    assert_eq!(journal.lock().len(), 2, "每条消息恰好转换一次");
    assert_eq!(pipeline.history().len(), 2);
}

#[test]
fn bounded_wait_times_out_without_workers() {
    let pipeline = pipeline_with(Vec::new(), 1);
    let message = pipeline.arena().create_root(ByteRegion::from("m"));
    pipeline.submit(Arc::clone(&message)).expect("管线开放");
    let err = pipeline
        .executor()
        .wait_until_parsed(&message, Some(Duration::from_millis(20)))
        .expect_err("没有工作线程，消息不会完成");
    assert_eq!(err.code(), "pipeline.timeout");

    // 优雅关闭在调用线程上处理剩余消息。
    pipeline.shutdown(ShutdownMode::Graceful);
    assert_eq!(pipeline.executor().wait_until_parsed(&message, None), Ok(()));
}

#[test]
fn interrupt_cancels_waiters() {
    let pipeline = pipeline_with(Vec::new(), 1);
    let message = pipeline.arena().create_root(ByteRegion::from("m"));
    pipeline.submit(Arc::clone(&message)).expect("管线开放");

    let history = Arc::clone(pipeline.history());
    let waiter = {
        let message = Arc::clone(&message);
        thread::spawn(move || history.wait_until_parsed(&message, None))
    };
    thread::sleep(Duration::from_millis(20));
    pipeline.shutdown(ShutdownMode::Interrupt);

    assert_eq!(
        waiter.join().expect("等待线程正常结束"),
        Err(CoreError::Cancelled { element: message.id() })
    );
    let late = pipeline.arena().create_root(ByteRegion::from("late"));
    assert!(matches!(pipeline.submit(late), Err(CoreError::Cancelled { .. })));
}

/// 插件可以通过执行器递归转换自己创建的子元素。
struct Splitter;

impl ConversionPlugin for Splitter {
    fn name(&self) -> &str {
        "splitter"
    }

    fn phase(&self) -> Phase {
        Phase::StructuralParse
    }

    fn is_active(&self, element: &Element) -> bool {
        element.content().index_of_byte(b',', 0).is_some()
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError> {
        let items: Vec<Arc<Element>> = element
            .content()
            .split(b",")
            .into_iter()
            .map(|part| executor.arena().create_child(element, part))
            .collect();
        for item in &items {
            executor.convert(item);
        }
        element.add_facet(prism_core::facets::ListFacet::new(items));
        Ok(())
    }
}

#[test]
fn plugins_recurse_into_children() {
    let plugins: Vec<Arc<dyn ConversionPlugin>> = vec![Arc::new(Splitter)];
    let pipeline = pipeline_with(plugins, 1);
    let message = pipeline.arena().create_root(ByteRegion::from("a,b;c,d"));
    pipeline.convert_now(&message).expect("新消息可转换");
    let parts: Vec<String> = message
        .find_all("$.*")
        .expect("合法路径")
        .iter()
        .map(|e| e.raw_string_content())
        .collect();
    assert_eq!(parts, ["a", "b;c", "d"]);
}
