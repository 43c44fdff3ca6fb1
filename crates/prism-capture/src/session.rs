//! 抓包会话门面：把配置、插件注册表、转换管线与抓包读写组装在一起。
//!
//! # 教案式说明
//! - **意图（Why）**：测试工具只关心“注入消息、等待、查询、导出”，不应手工拼装注册表与管线；
//! - **契约（What）**：
//!   - 注入顺序即历史顺序；重复的 UUID 被跳过且不产生新元素；
//!   - [`CaptureSession::wait`] 之后读取的消息及其之前的全部消息都已完成转换；
//!   - 导出跳过带 [`NonTransmissionFacet`] 的消息，其余按到达顺序写出；
//! - **实现（How）**：UUID 去重使用 `DashMap`，注入端是单一生产者，工作线程数取自配置。

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use prism_core::{
    ByteRegion, Element, ElementArena, ElementId, PathQuery, PredicateEvaluator,
    facets::{MessageTimingFacet, NonTransmissionFacet, TcpIpMessageFacet},
};
use prism_pipeline::{
    ConversionPipeline, ConversionPlugin, MessageHistory, PluginRegistry, ShutdownMode,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    CaptureError, PairingPlugin, PrismConfig,
    format::{CaptureIdFacet, CaptureRecord, CapturedMessage, record_of},
};

/// 一次导入的统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// UUID 已在会话中出现而被跳过的记录数。
    pub duplicates: usize,
}

pub struct CaptureSession {
    config: PrismConfig,
    pipeline: ConversionPipeline,
    uuids: DashMap<String, ElementId>,
    next_sequence: AtomicU64,
}

impl CaptureSession {
    /// 以内置解码插件与配对插件启动会话。
    pub fn new(config: PrismConfig) -> Result<Self, CaptureError> {
        Self::with_plugins(config, Vec::new())
    }

    /// 在内置插件之外追加自定义插件。
    pub fn with_plugins(
        config: PrismConfig,
        plugins: Vec<Arc<dyn ConversionPlugin>>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let registry = Arc::new(PluginRegistry::new());
        prism_codecs::register_defaults(&registry)?;
        registry.register(Arc::new(PairingPlugin::new(
            config.pairing.strategy,
            config.pairing.wait_timeout(),
        )))?;
        for plugin in plugins {
            registry.register(plugin)?;
        }
        let pipeline = ConversionPipeline::new(
            registry,
            ElementArena::new(),
            Arc::new(MessageHistory::new()),
            config.pipeline.clone(),
        )?;
        pipeline.start()?;
        info!(
            workers = config.pipeline.workers,
            strategy = ?config.pairing.strategy,
            "capture session started"
        );
        Ok(Self {
            config,
            pipeline,
            uuids: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PrismConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    /// 按到达顺序的全部消息。
    pub fn messages(&self) -> Vec<Arc<Element>> {
        self.pipeline.history().messages()
    }

    pub fn message_by_uuid(&self, uuid: &str) -> Option<Arc<Element>> {
        let id = *self.uuids.get(uuid)?;
        self.pipeline.arena().get(id)
    }

    /// 注入一条消息并提交转换；UUID 已存在时返回 `Ok(None)`。
    ///
    /// 提交失败（例如会话已关闭）时 UUID 不会被占用，同一条消息之后仍可注入其他会话或重试。
    pub fn ingest(&self, message: CapturedMessage) -> Result<Option<Arc<Element>>, CaptureError> {
        let uuid = message
            .uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        // 空位在提交完成前一直持有分片锁，同一 UUID 的并发注入只会成功一次。
        let slot = match self.uuids.entry(uuid.clone()) {
            Entry::Occupied(_) => {
                debug!(%uuid, "duplicate capture uuid skipped");
                return Ok(None);
            }
            Entry::Vacant(slot) => slot,
        };
        if !self.pipeline.is_accepting() {
            return Err(CaptureError::SessionClosed);
        }

        let mut content = ByteRegion::with_chunk_capacity(self.config.buffer.chunk_capacity);
        content.append(&message.content);
        let arena = self.pipeline.arena();
        let element = arena.create_root(content);
        let sequence_number = message
            .sequence_number
            .unwrap_or_else(|| self.next_sequence.fetch_add(1, Ordering::Relaxed));
        TcpIpMessageFacet::attach(arena, &element, message.sender, message.receiver, sequence_number);
        if let Some(timestamp) = message.timestamp {
            element.add_facet(MessageTimingFacet::new(timestamp));
        }
        if message.non_transmission {
            element.add_facet(NonTransmissionFacet);
        }
        element.add_facet(CaptureIdFacet::new(uuid));
        self.pipeline.submit(Arc::clone(&element))?;
        slot.insert(element.id());
        Ok(Some(element))
    }

    /// 逐行读取 JSON Lines 抓包；空行被忽略，重复 UUID 被跳过，顺序保持不变。
    pub fn import(&self, reader: impl BufRead) -> Result<ImportSummary, CaptureError> {
        let mut summary = ImportSummary::default();
        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: CaptureRecord = serde_json::from_str(&line).map_err(|source| CaptureError::Json {
                line: line_number,
                source,
            })?;
            match self.ingest(CapturedMessage::from_record(record, line_number)?)? {
                Some(_) => summary.imported += 1,
                None => summary.duplicates += 1,
            }
        }
        info!(
            imported = summary.imported,
            duplicates = summary.duplicates,
            "capture imported"
        );
        Ok(summary)
    }

    pub fn import_file(&self, path: impl AsRef<Path>) -> Result<ImportSummary, CaptureError> {
        self.import(BufReader::new(File::open(path)?))
    }

    /// 以 JSON Lines 写出全部可传输消息，返回写出的条数。
    pub fn export(&self, mut writer: impl Write) -> Result<usize, CaptureError> {
        let mut written = 0;
        for message in self.messages() {
            if message.has_facet::<NonTransmissionFacet>() {
                continue;
            }
            serde_json::to_writer(&mut writer, &record_of(&message)).map_err(CaptureError::Encode)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<usize, CaptureError> {
        self.export(BufWriter::new(File::create(path)?))
    }

    /// 等待到目前为止注入的全部消息完成转换；`timeout` 是整个等待的上限。
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), CaptureError> {
        self.pipeline.history().wait_until_all_parsed(timeout)?;
        Ok(())
    }

    /// 在每条消息上执行路径查询，按到达顺序拼接结果。
    pub fn find_all(&self, path: &str) -> Result<Vec<Arc<Element>>, CaptureError> {
        self.find_all_with(path, None)
    }

    pub fn find_all_with(
        &self,
        path: &str,
        evaluator: Option<&dyn PredicateEvaluator>,
    ) -> Result<Vec<Arc<Element>>, CaptureError> {
        let query = PathQuery::parse(path)?;
        let mut matches = Vec::new();
        for message in self.messages() {
            matches.extend(query.execute(&message, evaluator)?);
        }
        Ok(matches)
    }

    /// 关闭管线；优雅关闭会先处理完已注入的消息。
    pub fn shutdown(&self, mode: ShutdownMode) {
        self.pipeline.shutdown(mode);
    }
}
