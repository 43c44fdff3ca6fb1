use std::{io, path::PathBuf};

use prism_core::{CoreError, facets::InvalidEndpoint};
use thiserror::Error;

/// 抓包会话层的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：会话层直接面对文件、外部 JSON 与配置文本，失败来源比核心层更杂；
///   这里统一收口，并保留来源错误供 `anyhow` 之类的上层框架回溯。
/// - **契约 (What)**：抓包记录相关的变体携带 1 起始的行号；`code()` 遵循 `<域>.<语义>` 约定，与核心错误码并列稳定。
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// 抓包行不是合法的 JSON 记录。
    #[error("capture line {line} is not a valid record: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// `rawMessageContent` 不是合法的 base64。
    #[error("capture line {line} carries invalid base64 content: {source}")]
    Base64 {
        line: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("capture line {line}: {source}")]
    Endpoint {
        line: usize,
        #[source]
        source: InvalidEndpoint,
    },

    #[error("capture line {line} has a non-numeric sequence number `{value}`")]
    SequenceNumber { line: usize, value: String },

    /// 会话已关闭，不再接受新消息。
    #[error("capture session is closed")]
    SessionClosed,

    /// 写出抓包记录时序列化失败。
    #[error("failed to encode capture record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 配置文本合法但取值不可用。
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration `{path}`: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 日志订阅器已经安装过，或外部已设置全局订阅器。
    #[error("logging already installed: {0}")]
    LoggingInstalled(&'static str),

    #[error("invalid log filter `{filter}`: {detail}")]
    LogFilter { filter: String, detail: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CaptureError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::Io(_) => "capture.io",
            CaptureError::Json { .. } => "capture.json",
            CaptureError::Base64 { .. } => "capture.base64",
            CaptureError::Endpoint { .. } => "capture.endpoint",
            CaptureError::SequenceNumber { .. } => "capture.sequence_number",
            CaptureError::SessionClosed => "capture.closed",
            CaptureError::Encode(_) => "capture.encode",
            CaptureError::ConfigParse(_) | CaptureError::Config(_) | CaptureError::ConfigFile { .. } => {
                "config.invalid"
            }
            CaptureError::LoggingInstalled(_) | CaptureError::LogFilter { .. } => "logging.install",
            CaptureError::Core(inner) => inner.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_codes() {
        let error = CaptureError::from(CoreError::Cancelled {
            element: prism_core::ElementId::from_index(3),
        });
        assert_eq!(error.code(), "pipeline.cancelled");
        assert_eq!(error.to_string(), "waiting for element #3 was cancelled");
    }

    #[test]
    fn record_errors_name_the_line() {
        let error = CaptureError::SequenceNumber {
            line: 4,
            value: "x1".to_owned(),
        };
        assert_eq!(error.code(), "capture.sequence_number");
        assert!(error.to_string().contains("line 4"));
    }
}
