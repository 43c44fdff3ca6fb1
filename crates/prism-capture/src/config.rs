//! 会话配置：TOML 文本到强类型结构。
//!
//! # 契约说明（What）
//! - 每个字段都有默认值，空文本即得到可用配置；未知键直接拒绝，避免拼写错误被静默忽略；
//! - 语法正确但取值不可用（分块容量为 0、工作线程为 0）由 [`PrismConfig::validate`] 报告。

use std::{fs, path::Path, time::Duration};

use prism_buffer::DEFAULT_CHUNK_CAPACITY;
use prism_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

use crate::{CaptureError, PairingStrategy};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrismConfig {
    pub buffer: BufferConfig,
    pub pipeline: PipelineConfig,
    pub pairing: PairingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// 新建消息字节区域的分块容量。
    pub chunk_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PairingConfig {
    pub strategy: PairingStrategy,
    /// 配对前等待之前全部消息完成的上限（毫秒）。
    ///
    /// 缺省不设上限：配对只取决于之前的消息是否完成，与墙钟无关。设置上限后，
    /// 超时的响应不会被配对，并带上一条警告注释。
    pub wait_timeout_ms: Option<u64>,
}

impl PairingConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing-subscriber` 的 `EnvFilter` 指令，`RUST_LOG` 存在时以其为准。
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

impl PrismConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, CaptureError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并校验配置文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CaptureError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.buffer.chunk_capacity == 0 {
            return Err(CaptureError::Config("buffer.chunk_capacity must be at least 1".to_owned()));
        }
        if self.pipeline.workers == 0 {
            return Err(CaptureError::Config("pipeline.workers must be at least 1".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let config = PrismConfig::from_toml_str("").expect("空配置合法");
        assert_eq!(config, PrismConfig::default());
        assert_eq!(config.buffer.chunk_capacity, 8 * 1024);
        assert_eq!(config.pipeline.workers, 1);
        assert_eq!(config.pairing.strategy, PairingStrategy::Nearest);
        assert_eq!(config.pairing.wait_timeout(), None);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = PrismConfig::from_toml_str(
            r#"
            [buffer]
            chunk_capacity = 512

            [pipeline]
            workers = 4

            [pairing]
            strategy = "oldest"
            wait_timeout_ms = 250

            [logging]
            filter = "prism_pipeline=debug"
            "#,
        )
        .expect("合法配置");
        assert_eq!(config.buffer.chunk_capacity, 512);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pairing.strategy, PairingStrategy::Oldest);
        assert_eq!(config.pairing.wait_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.logging.filter, "prism_pipeline=debug");
    }

    #[test]
    fn unusable_values_are_rejected() {
        let zero_workers = PrismConfig::from_toml_str("[pipeline]\nworkers = 0\n").expect_err("工作线程为 0");
        assert_eq!(zero_workers.code(), "config.invalid");
        assert!(zero_workers.to_string().contains("pipeline.workers"));

        let unknown = PrismConfig::from_toml_str("[buffer]\nchunk = 1\n").expect_err("未知键");
        assert!(matches!(unknown, CaptureError::ConfigParse(_)));

        let pipeline_typo = PrismConfig::from_toml_str("[pipeline]\nworker = 8\n").expect_err("拼写错误的键");
        assert!(matches!(pipeline_typo, CaptureError::ConfigParse(_)));
        assert!(pipeline_typo.to_string().contains("worker"), "{pipeline_typo}");

        let strategy = PrismConfig::from_toml_str("[pairing]\nstrategy = \"random\"\n").expect_err("未知策略");
        assert!(matches!(strategy, CaptureError::ConfigParse(_)));
    }
}
