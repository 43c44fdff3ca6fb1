//! 持久化抓包格式：每行一条 JSON 记录（JSON Lines）。
//!
//! ```text
//! {"rawMessageContent":"R0VUIC8gSFRUUC8xLjENCg0K","senderHostname":"10.0.0.1:5000",
//!  "receiverHostname":"10.0.0.2:80","sequenceNumber":"0","timestamp":"2024-05-01T10:00:00Z",
//!  "uuid":"4f1c..."}
//! ```
//!
//! - `rawMessageContent`：base64 标准字母表；
//! - `senderHostname`/`receiverHostname`：`host:port`，缺失时为空串；
//! - `sequenceNumber`：十进制字符串；`timestamp`：ISO-8601，可省略；`uuid`：消息唯一标识。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use prism_core::{
    Element, Facet,
    facets::{Endpoint, MessageTimingFacet, TcpIpMessageFacet},
};
use serde::{Deserialize, Serialize};

use crate::CaptureError;

/// 一行抓包记录的线上形态。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub raw_message_content: String,
    #[serde(default)]
    pub sender_hostname: String,
    #[serde(default)]
    pub receiver_hostname: String,
    #[serde(default)]
    pub sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// 一条待注入会话的消息。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedMessage {
    pub content: Vec<u8>,
    pub sender: Option<Endpoint>,
    pub receiver: Option<Endpoint>,
    /// 缺省时由会话按注入顺序分配。
    pub sequence_number: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// 缺省时由会话生成随机 UUID。
    pub uuid: Option<String>,
    /// 标记内容不得被转发或持久化。
    pub non_transmission: bool,
}

impl CapturedMessage {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn between(mut self, sender: Endpoint, receiver: Endpoint) -> Self {
        self.sender = Some(sender);
        self.receiver = Some(receiver);
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn non_transmittable(mut self) -> Self {
        self.non_transmission = true;
        self
    }

    /// 从第 `line` 行（1 起始）的记录解码。
    pub fn from_record(record: CaptureRecord, line: usize) -> Result<Self, CaptureError> {
        let content = STANDARD
            .decode(record.raw_message_content.as_bytes())
            .map_err(|source| CaptureError::Base64 { line, source })?;
        let endpoint = |text: &str| -> Result<Option<Endpoint>, CaptureError> {
            if text.trim().is_empty() {
                return Ok(None);
            }
            text.parse()
                .map(Some)
                .map_err(|source| CaptureError::Endpoint { line, source })
        };
        let sequence_number = record
            .sequence_number
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| CaptureError::SequenceNumber { line, value })
            })
            .transpose()?;
        Ok(Self {
            content,
            sender: endpoint(&record.sender_hostname)?,
            receiver: endpoint(&record.receiver_hostname)?,
            sequence_number,
            timestamp: record.timestamp,
            uuid: record.uuid.filter(|uuid| !uuid.is_empty()),
            non_transmission: false,
        })
    }
}

/// 抓包标识：导入去重与导出时使用的 UUID。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureIdFacet {
    uuid: String,
}

impl CaptureIdFacet {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl Facet for CaptureIdFacet {
    fn name(&self) -> &'static str {
        "capture.id"
    }
}

/// 把一条顶层消息编码为记录。
pub(crate) fn record_of(message: &Element) -> CaptureRecord {
    let transport = message.facet::<TcpIpMessageFacet>();
    let endpoint_text = |endpoint: Option<&Endpoint>| endpoint.map(ToString::to_string).unwrap_or_default();
    CaptureRecord {
        raw_message_content: STANDARD.encode(message.raw_content()),
        sender_hostname: endpoint_text(transport.as_ref().and_then(|facet| facet.sender())),
        receiver_hostname: endpoint_text(transport.as_ref().and_then(|facet| facet.receiver())),
        sequence_number: transport
            .as_ref()
            .map(|facet| facet.sequence_number().to_string()),
        timestamp: message
            .facet::<MessageTimingFacet>()
            .map(|facet| facet.transmitted_at()),
        uuid: message
            .facet::<CaptureIdFacet>()
            .map(|facet| facet.uuid().to_owned()),
    }
}
