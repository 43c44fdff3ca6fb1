//! JSON 正文富化插件。
//!
//! # 教案式说明
//! - **意图（Why）**：HTTP 正文在分帧后只是一段不透明字节；`Content-Type` 声明为 JSON 时，
//!   把它展开成映射、列表与标量切面，路径查询即可直接写 `$.body.items[0]`。
//! - **契约（What）**：正文元素挂 [`NestedFacet`]，其 `content` 子元素是 JSON 文档根（[`RootFacet`]）；
//!   每个 JSON 值对应一个元素，字节是正文中该值的原始文本切片；重复键按出现顺序全部保留。
//! - **实现（How）**：借助 `serde_json::value::RawValue` 的借用反序列化拿到每个值在正文中的原始文本，
//!   用指针偏移换算为字节区间，再逐层递归。
//! - **风险（Trade-offs）**：每一层各做一次反序列化，深层文档的总代价与深度成正比；
//!   嵌套深度受 `serde_json` 默认递归上限保护。

use std::{fmt, sync::Arc};

use prism_core::{
    ByteRegion, CoreError, Element, ElementArena,
    facets::{HttpHeaderFacet, HttpMessageFacet, ListFacet, MapFacet, NestedFacet, RootFacet, Value, ValueFacet},
};
use prism_pipeline::{ConversionExecutor, ConversionPlugin, Phase};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;
use tracing::debug;

pub(crate) const NAME: &str = "json";

/// 把 JSON 类型的 HTTP 正文展开为元素树。
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonBodyPlugin;

impl JsonBodyPlugin {
    fn body_of(element: &Element) -> Option<Arc<Element>> {
        let message = element.facet::<HttpMessageFacet>()?;
        let content_type = message
            .header()
            .facet::<HttpHeaderFacet>()?
            .value_of("Content-Type")?;
        let body = message.body();
        (content_type.to_ascii_lowercase().contains("json")
            && !body.content().is_empty()
            && !body.has_facet::<NestedFacet>())
        .then(|| Arc::clone(body))
    }
}

impl ConversionPlugin for JsonBodyPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn phase(&self) -> Phase {
        Phase::ContentEnrichment
    }

    fn follows(&self) -> &[&'static str] {
        &[crate::http::NAME]
    }

    fn is_active(&self, element: &Element) -> bool {
        Self::body_of(element).is_some()
    }

    fn consume(&self, element: &Arc<Element>, executor: &ConversionExecutor) -> Result<(), CoreError> {
        let Some(body) = Self::body_of(element) else {
            return Ok(());
        };
        let bytes = body.raw_content();
        let text = std::str::from_utf8(&bytes).map_err(invalid)?;
        let root: &RawValue = serde_json::from_str(text).map_err(invalid)?;
        let builder = TreeBuilder {
            arena: executor.arena(),
            body: body.content(),
            text,
        };
        let document = builder.build(&body, root)?;
        document.add_facet(RootFacet);
        body.add_facet(NestedFacet::new(document));
        debug!(element = %element.id(), body = %body.id(), "json body expanded");
        Ok(())
    }
}

fn invalid(error: impl fmt::Display) -> CoreError {
    CoreError::plugin(NAME, format!("body is not valid JSON: {error}"))
}

struct TreeBuilder<'a> {
    arena: &'a Arc<ElementArena>,
    body: &'a ByteRegion,
    text: &'a str,
}

impl TreeBuilder<'_> {
    fn build(&self, parent: &Element, raw: &RawValue) -> Result<Arc<Element>, CoreError> {
        let json = raw.get();
        let from = (json.as_ptr() as usize)
            .checked_sub(self.text.as_ptr() as usize)
            .ok_or_else(|| CoreError::plugin(NAME, "value does not borrow from the body"))?;
        let element = self
            .arena
            .create_child(parent, self.body.slice(from, from + json.len())?);

        match json.as_bytes().first() {
            Some(b'{') => {
                let Entries(entries) = serde_json::from_str(json).map_err(invalid)?;
                let mut children = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    children.push((key, self.build(&element, value)?));
                }
                element.add_facet(MapFacet::new(children));
            }
            Some(b'[') => {
                let items: Vec<&RawValue> = serde_json::from_str(json).map_err(invalid)?;
                let children = items
                    .into_iter()
                    .map(|item| self.build(&element, item))
                    .collect::<Result<Vec<_>, _>>()?;
                element.add_facet(ListFacet::new(children));
            }
            _ => {
                let scalar: serde_json::Value = serde_json::from_str(json).map_err(invalid)?;
                element.add_facet(ValueFacet::new(scalar_value(scalar)));
            }
        }
        Ok(element)
    }
}

fn scalar_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Bool(flag) => Value::Bool(flag),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => Value::Integer(integer),
            None => number.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(text) => Value::Text(text),
        _ => Value::Null,
    }
}

/// JSON 对象的有序键值对，值保留为原始文本以便换算字节区间。
struct Entries<'a>(Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for Entries<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries<'de>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, &'de RawValue>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(json: &str) -> (Arc<ElementArena>, Arc<Element>) {
        let arena = ElementArena::new();
        let body = arena.create_root(ByteRegion::from(json));
        let root: &RawValue = serde_json::from_str(json).expect("合法 JSON");
        let builder = TreeBuilder {
            arena: &arena,
            body: body.content(),
            text: json,
        };
        let document = builder.build(&body, root).expect("建树成功");
        (arena, document)
    }

    #[test]
    fn duplicate_keys_are_kept_in_order() {
        let (_arena, document) = expand(r#" {"b":1,"a":{"c":true},"b":2.5} "#);
        assert_eq!(document.raw_string_content(), r#"{"b":1,"a":{"c":true},"b":2.5}"#);
        let keys: Vec<String> = document.child_nodes_with_key().keys().map(str::to_owned).collect();
        assert_eq!(keys, ["b", "a", "b"]);
        let values: Vec<String> = document
            .find_all("$.b")
            .expect("合法路径")
            .iter()
            .map(|element| element.raw_string_content())
            .collect();
        assert_eq!(values, ["1", "2.5"]);
        let flag = document.find_element("$.a.c").expect("合法路径").expect("存在");
        assert_eq!(flag.facet_or_fail::<ValueFacet>().expect("标量").value(), &Value::Bool(true));
    }

    #[test]
    fn string_leaves_keep_raw_bytes_and_decoded_text() {
        let (_arena, document) = expand(r#"["a\"b", null, -3]"#);
        let items = document.child_nodes();
        assert_eq!(items[0].raw_string_content(), r#""a\"b""#);
        assert_eq!(items[0].facet_or_fail::<ValueFacet>().expect("标量").value().as_text(), Some("a\"b"));
        assert!(items[1].facet_or_fail::<ValueFacet>().expect("标量").value().is_null());
        assert_eq!(items[2].facet_or_fail::<ValueFacet>().expect("标量").value().as_i64(), Some(-3));
    }
}
