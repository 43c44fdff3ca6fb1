//! HTTP/1.x 分帧插件。
//!
//! ## 关键流程（How）
//! 1. 以 `\r\n\r\n` 切分头部块与正文，缺失分隔符视为结构损坏；
//! 2. 解析起始行，区分请求与响应；
//! 3. 逐行解析头部字段，取值去除首尾空白后作为头部元素的子元素；
//! 4. `Content-Length` 小于剩余字节时只把声明长度计入正文；
//! 5. 请求目标拆为基础路径与查询参数，参数键先做 URL 解码。

mod start_line;

use std::{ops::Range, sync::Arc};

use prism_core::{
    ByteRegion, Charset, CoreError, Element, ElementArena, OrderedMultiMap,
    facets::{
        HttpHeaderFacet, HttpMessageFacet, HttpRequestFacet, HttpResponseFacet, UriFacet,
        ValueFacet,
    },
    query::url_decode,
};
use prism_pipeline::{ConversionExecutor, ConversionPlugin, Phase};
use tracing::debug;

use self::start_line::{StartLine, parse_start_line, parse_target};

pub(crate) const NAME: &str = "http";

/// 识别 HTTP/1.x 请求与响应，生成头部、正文、起始行与请求目标的切面。
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpFramingPlugin;

impl ConversionPlugin for HttpFramingPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn phase(&self) -> Phase {
        Phase::StructuralParse
    }

    fn is_active(&self, element: &Element) -> bool {
        if element.has_facet::<HttpMessageFacet>() {
            return false;
        }
        let content = element.content();
        let line_end = content.index_of(b"\r\n", 0).unwrap_or(content.len());
        parse_start_line(&element.raw_content()[..line_end]).is_some()
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError> {
        let content = element.content();
        let bytes = element.raw_content();
        let header_end = content
            .index_of(b"\r\n\r\n", 0)
            .ok_or_else(|| CoreError::plugin(NAME, "header block is not terminated by an empty line"))?;
        let line_end = content
            .index_of(b"\r\n", 0)
            .filter(|&end| end < header_end)
            .unwrap_or(header_end);
        let start_line = parse_start_line(&bytes[..line_end])
            .ok_or_else(|| CoreError::plugin(NAME, "unrecognised start line"))?;

        let arena = executor.arena();
        let fields_start = (line_end + 2).min(header_end);
        let header = carve(arena, element, content, fields_start..header_end)?;
        let fields = header_fields(arena, &header, content, &bytes, fields_start..header_end)?;
        let declared_length = fields
            .get_first_ignore_case("Content-Length")
            .and_then(|value| value.raw_string_content().trim().parse::<usize>().ok());
        if declared_length.is_none() && fields.contains_key_ignore_case("Transfer-Encoding") {
            debug!(element = %element.id(), "transfer-encoded body kept as received");
        }
        header.add_facet(HttpHeaderFacet::new(fields));

        let body_start = header_end + 4;
        let body_end = declared_length.map_or(bytes.len(), |length| {
            bytes.len().min(body_start.saturating_add(length))
        });
        let body = carve(arena, element, content, body_start..body_end)?;
        element.add_facet(HttpMessageFacet::new(header, body));

        match start_line {
            StartLine::Request { method, target } => {
                let method_element = carve(arena, element, content, method.clone())?;
                method_element.add_facet(ValueFacet::text(Charset::Latin1.decode(&bytes[method])));
                let path = request_target(arena, element, content, &bytes, target)?;
                element.add_facet(HttpRequestFacet::new(method_element, path));
            }
            StartLine::Response {
                code,
                status,
                reason,
            } => {
                let code_element = carve(arena, element, content, code)?;
                code_element.add_facet(ValueFacet::new(i64::from(status)));
                let reason_element = reason
                    .map(|range| {
                        let reason = carve(arena, element, content, range.clone())?;
                        reason.add_facet(ValueFacet::text(Charset::Latin1.decode(&bytes[range])));
                        Ok::<_, CoreError>(reason)
                    })
                    .transpose()?;
                element.add_facet(HttpResponseFacet::new(code_element, reason_element));
            }
        }
        debug!(
            element = %element.id(),
            body_len = body_end - body_start,
            "http message framed"
        );
        Ok(())
    }
}

/// 以消息字节的 `range` 区间创建 `parent` 的子元素。
fn carve(
    arena: &Arc<ElementArena>,
    parent: &Element,
    message: &ByteRegion,
    range: Range<usize>,
) -> Result<Arc<Element>, CoreError> {
    Ok(arena.create_child(parent, message.slice(range.start, range.end)?))
}

fn header_fields(
    arena: &Arc<ElementArena>,
    header: &Element,
    message: &ByteRegion,
    bytes: &[u8],
    block: Range<usize>,
) -> Result<OrderedMultiMap<Arc<Element>>, CoreError> {
    let mut fields = OrderedMultiMap::new();
    let mut line_start = block.start;
    while line_start < block.end {
        let line_end = message
            .index_of(b"\r\n", line_start)
            .filter(|&end| end < block.end)
            .unwrap_or(block.end);
        let line = &bytes[line_start..line_end];
        match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let name = Charset::Latin1.decode(trim(&line[..colon]));
                let value = trimmed_range(line, colon + 1);
                let element = carve(
                    arena,
                    header,
                    message,
                    line_start + value.start..line_start + value.end,
                )?;
                element.add_facet(ValueFacet::text(Charset::Latin1.decode(&line[value])));
                fields.push(name, element);
            }
            None => debug!(
                element = %header.id(),
                line = %Charset::Latin1.decode(line),
                "skipping header line without a colon"
            ),
        }
        line_start = line_end + 2;
    }
    Ok(fields)
}

fn request_target(
    arena: &Arc<ElementArena>,
    message_element: &Element,
    message: &ByteRegion,
    bytes: &[u8],
    target: Range<usize>,
) -> Result<Arc<Element>, CoreError> {
    let offset = target.start;
    let parsed = parse_target(&bytes[target.clone()]);
    let path = carve(arena, message_element, message, target)?;
    let basic_path = carve(
        arena,
        &path,
        message,
        offset + parsed.basic_path.start..offset + parsed.basic_path.end,
    )?;
    basic_path.add_facet(ValueFacet::text(Charset::Latin1.decode(
        &bytes[offset + parsed.basic_path.start..offset + parsed.basic_path.end],
    )));

    let mut parameters = OrderedMultiMap::with_capacity(parsed.parameters.len());
    for (name, range) in parsed.parameters {
        let absolute = offset + range.start..offset + range.end;
        let raw = String::from_utf8_lossy(&bytes[absolute.clone()]).into_owned();
        let value = carve(arena, &path, message, absolute)?;
        value.add_facet(ValueFacet::text(url_decode(&raw).unwrap_or(raw)));
        parameters.push(name, value);
    }
    path.add_facet(UriFacet::new(basic_path, parameters));
    Ok(path)
}

fn is_whitespace(byte: &u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

fn trim(bytes: &[u8]) -> &[u8] {
    let range = trimmed_range(bytes, 0);
    &bytes[range]
}

/// `bytes[from..]` 去除首尾空格与制表符后的区间。
fn trimmed_range(bytes: &[u8], from: usize) -> Range<usize> {
    let start = bytes[from..]
        .iter()
        .position(|b| !is_whitespace(b))
        .map_or(bytes.len(), |index| from + index);
    let end = bytes[start..]
        .iter()
        .rposition(|b| !is_whitespace(b))
        .map_or(start, |index| start + index + 1);
    start..end
}
