//! 与具体协议无关的结构切面：映射、列表、透明包装与结构根。

use std::sync::Arc;

use crate::{Element, Facet, OrderedMultiMap};

/// 有序映射（JSON 对象、表单等），子节点即各条目。
#[derive(Clone, Debug, Default)]
pub struct MapFacet {
    entries: OrderedMultiMap<Arc<Element>>,
}

impl MapFacet {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, Arc<Element>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> &OrderedMultiMap<Arc<Element>> {
        &self.entries
    }
}

impl Facet for MapFacet {
    fn name(&self) -> &'static str {
        "map"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        self.entries.clone()
    }
}

/// 有序列表（JSON 数组等），子节点键为 `"0"`、`"1"`……
#[derive(Clone, Debug, Default)]
pub struct ListFacet {
    items: Vec<Arc<Element>>,
}

impl ListFacet {
    pub fn new(items: Vec<Arc<Element>>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Arc<Element>] {
        &self.items
    }
}

impl Facet for ListFacet {
    fn name(&self) -> &'static str {
        "list"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), Arc::clone(item)))
            .collect()
    }
}

/// 透明包装：元素本身只是“解码后的内容”的外壳。
///
/// 路径下降时该元素被其 `content` 子节点替代，且永不出现在最终结果中。
#[derive(Clone, Debug)]
pub struct NestedFacet {
    content: Arc<Element>,
}

impl NestedFacet {
    pub fn new(content: Arc<Element>) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &Arc<Element> {
        &self.content
    }
}

impl Facet for NestedFacet {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        [("content", Arc::clone(&self.content))].into_iter().collect()
    }

    fn is_content_carrier(&self) -> bool {
        true
    }

    fn keep_in_final_result(&self) -> bool {
        false
    }
}

/// 标记元素是一段独立解码结构（如 JSON 文档）的根。
#[derive(Clone, Copy, Debug, Default)]
pub struct RootFacet;

impl Facet for RootFacet {
    fn name(&self) -> &'static str {
        "root"
    }
}
