use std::fmt;

/// 转换管线的固定阶段，声明顺序即执行顺序。
///
/// - `TransportUnwrap`：剥离传输层包装（TLS 解密后的应用数据、分帧等）；
/// - `StructuralParse`：识别消息结构（HTTP 起始行、头部、正文切分）；
/// - `ContentEnrichment`：按内容类型解码正文（JSON、XML……）；
/// - `Correlation`：跨消息关联，例如请求/响应配对。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    TransportUnwrap,
    StructuralParse,
    ContentEnrichment,
    Correlation,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::TransportUnwrap,
        Phase::StructuralParse,
        Phase::ContentEnrichment,
        Phase::Correlation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::TransportUnwrap => "transport-unwrap",
            Phase::StructuralParse => "structural-parse",
            Phase::ContentEnrichment => "content-enrichment",
            Phase::Correlation => "correlation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
