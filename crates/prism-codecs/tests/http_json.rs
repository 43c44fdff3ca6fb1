//! HTTP 分帧与 JSON 富化的端到端契约：原始字节经管线转换后，用路径查询读取字段。

use std::sync::Arc;

use prism_codecs::register_defaults;
use prism_core::{
    ByteRegion, Element, ElementArena,
    facets::{HttpMessageFacet, NestedFacet, ValueFacet},
};
use prism_pipeline::{ConversionPipeline, MessageHistory, PipelineConfig, PluginRegistry};
use tracing_test::traced_test;

fn pipeline() -> ConversionPipeline {
    let registry = Arc::new(PluginRegistry::new());
    register_defaults(&registry).expect("注册内置插件");
    ConversionPipeline::new(
        registry,
        ElementArena::new(),
        Arc::new(MessageHistory::new()),
        PipelineConfig::default(),
    )
    .expect("构造管线")
}

fn convert(pipeline: &ConversionPipeline, raw: &str) -> Arc<Element> {
    let message = pipeline.arena().create_root(ByteRegion::from(raw));
    pipeline.convert_now(&message).expect("新消息可转换");
    message
}

fn text_at(message: &Arc<Element>, path: &str) -> Option<String> {
    message
        .find_element(path)
        .expect("合法路径")
        .map(|element| element.raw_string_content())
}

fn value_at(message: &Arc<Element>, path: &str) -> prism_core::facets::Value {
    message
        .find_element(path)
        .expect("合法路径")
        .expect("元素存在")
        .facet_or_fail::<ValueFacet>()
        .expect("标量切面")
        .value()
        .clone()
}

const REQUEST: &str = "POST /api/items?x%2Did=7&flag&name=a+b HTTP/1.1\r\n\
Host: svc.local\r\n\
Content-Type: application/json; charset=utf-8\r\n\
Content-Length: 19\r\n\
\r\n\
{\"items\":[\"a\",\"b\"]}trailing";

#[test]
fn request_is_framed_into_queryable_parts() {
    let pipeline = pipeline();
    let message = convert(&pipeline, REQUEST);

    assert!(message.expects_reply());
    assert!(!message.is_reply());
    assert_eq!(text_at(&message, "$.method").as_deref(), Some("POST"));
    assert_eq!(text_at(&message, "$.path.basicPath").as_deref(), Some("/api/items"));
    assert_eq!(text_at(&message, "$.path.'x-id'").as_deref(), Some("7"));
    assert_eq!(text_at(&message, "$.path.flag").as_deref(), Some(""));
    assert_eq!(text_at(&message, "$.path.name").as_deref(), Some("a+b"));
    assert_eq!(value_at(&message, "$.path.name").as_text(), Some("a b"));
    assert_eq!(text_at(&message, "$.header.Host").as_deref(), Some("svc.local"));
    assert_eq!(
        text_at(&message, "$.header[~'content-type']").as_deref(),
        Some("application/json; charset=utf-8")
    );
}

#[test]
fn json_body_honours_content_length_and_is_transparent() {
    let pipeline = pipeline();
    let message = convert(&pipeline, REQUEST);

    let http = message.facet_or_fail::<HttpMessageFacet>().expect("已分帧");
    assert_eq!(http.body().raw_string_content(), "{\"items\":[\"a\",\"b\"]}");
    assert!(http.body().has_facet::<NestedFacet>());

    assert_eq!(text_at(&message, "$.body.items[1]").as_deref(), Some("\"b\""));
    assert_eq!(value_at(&message, "$.body.items[0]").as_text(), Some("a"));
    let leaves: Vec<String> = message
        .find_all("$..items.*")
        .expect("合法路径")
        .iter()
        .map(|element| element.raw_string_content())
        .collect();
    assert_eq!(leaves, ["\"a\"", "\"b\""]);
    // 包装节点本身不会出现在结果中，查询正文得到的是 JSON 文档根。
    assert_eq!(
        text_at(&message, "$.body").as_deref(),
        Some("{\"items\":[\"a\",\"b\"]}")
    );
}

#[test]
fn response_exposes_status_and_optional_reason() {
    let pipeline = pipeline();
    let not_found = convert(
        &pipeline,
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\r\nnope",
    );
    assert!(not_found.is_reply());
    assert_eq!(value_at(&not_found, "$.responseCode").as_i64(), Some(404));
    assert_eq!(text_at(&not_found, "$.reasonPhrase").as_deref(), Some("Not Found"));
    assert_eq!(text_at(&not_found, "$.body").as_deref(), Some("nope"));

    let no_content = convert(&pipeline, "HTTP/1.1 204\r\n\r\n");
    assert_eq!(value_at(&no_content, "$.responseCode").as_i64(), Some(204));
    assert!(no_content.find_all("$.reasonPhrase").expect("合法路径").is_empty());
    assert!(no_content.find_all("$.header.*").expect("合法路径").is_empty());
}

#[test]
#[traced_test]
fn broken_input_is_left_partially_understood() {
    let pipeline = pipeline();

    let unterminated = convert(&pipeline, "GET / HTTP/1.1\r\nHost: a\r\n");
    assert!(!unterminated.has_facet::<HttpMessageFacet>());
    assert!(logs_contain("header block is not terminated"));

    let bad_json = convert(
        &pipeline,
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"open\": ",
    );
    let http = bad_json.facet_or_fail::<HttpMessageFacet>().expect("头部仍然可读");
    assert!(!http.body().has_facet::<NestedFacet>());
    assert_eq!(value_at(&bad_json, "$.responseCode").as_i64(), Some(200));
    assert!(logs_contain("body is not valid JSON"));

    let not_http = convert(&pipeline, "\x16\x03\x01 binary");
    assert!(not_http.facets().is_empty());
}

#[test]
#[traced_test]
fn transfer_encoded_body_is_kept_as_received() {
    let pipeline = pipeline();
    let message = convert(
        &pipeline,
        "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    );
    assert_eq!(
        text_at(&message, "$.body").as_deref(),
        Some("5\r\nhello\r\n0\r\n\r\n")
    );
    assert!(logs_contain("transfer-encoded body kept as received"));
}
