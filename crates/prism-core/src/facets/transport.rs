//! 传输层切面：端点与序号、抓包时间、请求/响应配对链接。

use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use prism_buffer::ByteRegion;
use thiserror::Error;

use crate::{Element, ElementArena, ElementId, Facet, OrderedMultiMap, facets::ValueFacet};

/// `host[:port]` 形式的传输端点。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: Option<u16>,
}

/// 端点文本无法解析。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid endpoint `{0}`")]
pub struct InvalidEndpoint(pub String);

impl Endpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = InvalidEndpoint;

    /// 端口取最后一个 `:` 之后的部分，因此 `[::1]:8080` 也能正确拆分。
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidEndpoint(text.to_owned());
        let (host, port) = match text.rsplit_once(':') {
            Some((host, port)) if !host.ends_with(':') => {
                (host, Some(port.parse::<u16>().map_err(|_| invalid())?))
            }
            _ => (text, None),
        };
        if host.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

/// 一条经 TCP/IP 传输的消息：发送端、接收端与序号。
///
/// 端点是抓包元数据而非消息字节，因此 `sender`/`receiver` 子元素的字节区域为空，取值由 [`ValueFacet`] 承载。
#[derive(Clone, Debug)]
pub struct TcpIpMessageFacet {
    sender: Option<Endpoint>,
    receiver: Option<Endpoint>,
    sequence_number: u64,
    sender_node: Arc<Element>,
    receiver_node: Arc<Element>,
}

impl TcpIpMessageFacet {
    /// 为 `message` 创建端点子元素并挂载本切面。
    pub fn attach(
        arena: &Arc<ElementArena>,
        message: &Arc<Element>,
        sender: Option<Endpoint>,
        receiver: Option<Endpoint>,
        sequence_number: u64,
    ) -> Arc<Self> {
        let endpoint_node = |endpoint: &Option<Endpoint>| {
            let node = arena.create_child(message, ByteRegion::new());
            let text = endpoint.as_ref().map(ToString::to_string).unwrap_or_default();
            node.add_facet(ValueFacet::text(text));
            node
        };
        let facet = Arc::new(Self {
            sender_node: endpoint_node(&sender),
            receiver_node: endpoint_node(&receiver),
            sender,
            receiver,
            sequence_number,
        });
        message.add_facet_arc(Arc::clone(&facet) as Arc<dyn Facet>);
        facet
    }

    pub fn sender(&self) -> Option<&Endpoint> {
        self.sender.as_ref()
    }

    pub fn receiver(&self) -> Option<&Endpoint> {
        self.receiver.as_ref()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// `other` 的端点对是否恰好是本消息端点对的反向（主机与端口均相等）。
    pub fn is_reverse_of(&self, other: &TcpIpMessageFacet) -> bool {
        match (&self.sender, &self.receiver, &other.sender, &other.receiver) {
            (Some(sender), Some(receiver), Some(other_sender), Some(other_receiver)) => {
                sender == other_receiver && receiver == other_sender
            }
            _ => false,
        }
    }
}

impl Facet for TcpIpMessageFacet {
    fn name(&self) -> &'static str {
        "tcpip.message"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        [
            ("sender", Arc::clone(&self.sender_node)),
            ("receiver", Arc::clone(&self.receiver_node)),
        ]
        .into_iter()
        .collect()
    }
}

/// 抓包时刻。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageTimingFacet {
    transmitted_at: DateTime<Utc>,
}

impl MessageTimingFacet {
    pub fn new(transmitted_at: DateTime<Utc>) -> Self {
        Self { transmitted_at }
    }

    pub fn transmitted_at(&self) -> DateTime<Utc> {
        self.transmitted_at
    }
}

impl Facet for MessageTimingFacet {
    fn name(&self) -> &'static str {
        "timing"
    }
}

/// 请求与响应之间的对称链接，同时挂在两条消息上，创建后不再替换。
///
/// 只保存编号，两条消息之间不形成所有权环。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessagePairFacet {
    request: ElementId,
    response: ElementId,
}

impl MessagePairFacet {
    pub fn new(request: ElementId, response: ElementId) -> Self {
        Self { request, response }
    }

    pub fn request(&self) -> ElementId {
        self.request
    }

    pub fn response(&self) -> ElementId {
        self.response
    }

    /// 链接另一端的编号；`id` 不在链接中时返回 `None`。
    pub fn partner_of(&self, id: ElementId) -> Option<ElementId> {
        if id == self.request {
            Some(self.response)
        } else if id == self.response {
            Some(self.request)
        } else {
            None
        }
    }
}

impl Facet for MessagePairFacet {
    fn name(&self) -> &'static str {
        "message.pair"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_parse_host_and_port() {
        let endpoint: Endpoint = "[::1]:8443".parse().expect("IPv6 端点");
        assert_eq!(endpoint.host(), "[::1]");
        assert_eq!(endpoint.port(), Some(8443));
        assert_eq!("idp".parse::<Endpoint>(), Ok(Endpoint::new("idp", None)));
        assert!("host:http".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
    }

    #[test]
    fn reverse_requires_both_endpoints() {
        let arena = ElementArena::new();
        let x: Endpoint = "x:1".parse().expect("端点");
        let y: Endpoint = "y:2".parse().expect("端点");
        let a = arena.create_root(ByteRegion::new());
        let b = arena.create_root(ByteRegion::new());
        let c = arena.create_root(ByteRegion::new());
        let forward = TcpIpMessageFacet::attach(&arena, &a, Some(x.clone()), Some(y.clone()), 0);
        let backward = TcpIpMessageFacet::attach(&arena, &b, Some(y), Some(x.clone()), 1);
        let partial = TcpIpMessageFacet::attach(&arena, &c, Some(x), None, 2);
        assert!(backward.is_reverse_of(&forward));
        assert!(!forward.is_reverse_of(&forward));
        assert!(!partial.is_reverse_of(&forward));
        assert_eq!(
            b.find_element("$.receiver")
                .expect("合法路径")
                .map(|node| node.facet::<ValueFacet>().map(|v| v.value().to_string())),
            Some(Some("x:1".to_owned()))
        );
    }
}
