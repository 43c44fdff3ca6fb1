//! HTTP/1.x 的结构切面。
//!
//! 切面只描述“已经识别出的结构”，字节的切分由解码插件完成；所有子元素都是消息字节的切片。

use std::sync::Arc;

use crate::{Element, Facet, OrderedMultiMap};

/// 一条 HTTP 消息：头部块与正文。
#[derive(Clone, Debug)]
pub struct HttpMessageFacet {
    header: Arc<Element>,
    body: Arc<Element>,
}

impl HttpMessageFacet {
    pub fn new(header: Arc<Element>, body: Arc<Element>) -> Self {
        Self { header, body }
    }

    pub fn header(&self) -> &Arc<Element> {
        &self.header
    }

    pub fn body(&self) -> &Arc<Element> {
        &self.body
    }
}

impl Facet for HttpMessageFacet {
    fn name(&self) -> &'static str {
        "http.message"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        [
            ("header", Arc::clone(&self.header)),
            ("body", Arc::clone(&self.body)),
        ]
        .into_iter()
        .collect()
    }
}

/// 头部多值映射：键为头部名，值为头部取值元素。
#[derive(Clone, Debug, Default)]
pub struct HttpHeaderFacet {
    fields: OrderedMultiMap<Arc<Element>>,
}

impl HttpHeaderFacet {
    pub fn new(fields: OrderedMultiMap<Arc<Element>>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &OrderedMultiMap<Arc<Element>> {
        &self.fields
    }

    /// 大小写无关地读取第一个同名头部的文本值。
    pub fn value_of(&self, name: &str) -> Option<String> {
        self.fields
            .get_first_ignore_case(name)
            .map(|element| element.raw_string_content())
    }
}

impl Facet for HttpHeaderFacet {
    fn name(&self) -> &'static str {
        "http.header"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        self.fields.clone()
    }
}

/// 请求行：请求形态的消息，期望一条配对响应。
#[derive(Clone, Debug)]
pub struct HttpRequestFacet {
    method: Arc<Element>,
    path: Arc<Element>,
}

impl HttpRequestFacet {
    pub fn new(method: Arc<Element>, path: Arc<Element>) -> Self {
        Self { method, path }
    }

    pub fn method(&self) -> &Arc<Element> {
        &self.method
    }

    pub fn path(&self) -> &Arc<Element> {
        &self.path
    }
}

impl Facet for HttpRequestFacet {
    fn name(&self) -> &'static str {
        "http.request"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        [
            ("method", Arc::clone(&self.method)),
            ("path", Arc::clone(&self.path)),
        ]
        .into_iter()
        .collect()
    }

    fn expects_reply(&self) -> bool {
        true
    }
}

/// 状态行：响应形态的消息。
#[derive(Clone, Debug)]
pub struct HttpResponseFacet {
    response_code: Arc<Element>,
    reason_phrase: Option<Arc<Element>>,
}

impl HttpResponseFacet {
    pub fn new(response_code: Arc<Element>, reason_phrase: Option<Arc<Element>>) -> Self {
        Self {
            response_code,
            reason_phrase,
        }
    }

    pub fn response_code(&self) -> &Arc<Element> {
        &self.response_code
    }

    pub fn reason_phrase(&self) -> Option<&Arc<Element>> {
        self.reason_phrase.as_ref()
    }
}

impl Facet for HttpResponseFacet {
    fn name(&self) -> &'static str {
        "http.response"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        let mut children = OrderedMultiMap::with_capacity(2);
        children.push("responseCode", Arc::clone(&self.response_code));
        if let Some(reason) = &self.reason_phrase {
            children.push("reasonPhrase", Arc::clone(reason));
        }
        children
    }

    fn is_reply(&self) -> bool {
        true
    }
}

/// 请求目标：基础路径与已 URL 解码键名的查询参数。
#[derive(Clone, Debug)]
pub struct UriFacet {
    basic_path: Arc<Element>,
    parameters: OrderedMultiMap<Arc<Element>>,
}

impl UriFacet {
    pub fn new(basic_path: Arc<Element>, parameters: OrderedMultiMap<Arc<Element>>) -> Self {
        Self {
            basic_path,
            parameters,
        }
    }

    pub fn basic_path(&self) -> &Arc<Element> {
        &self.basic_path
    }

    pub fn parameters(&self) -> &OrderedMultiMap<Arc<Element>> {
        &self.parameters
    }
}

impl Facet for UriFacet {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        let mut children = OrderedMultiMap::with_capacity(self.parameters.len() + 1);
        children.push("basicPath", Arc::clone(&self.basic_path));
        children.extend(
            self.parameters
                .entries()
                .map(|(key, value)| (key, Arc::clone(value))),
        );
        children
    }
}
