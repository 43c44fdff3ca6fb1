use std::{
    any::{Any, type_name},
    fmt,
    sync::Arc,
};

use crate::{Element, OrderedMultiMap};

/// `Facet` 是元素字节的一种结构化解读。
///
/// # 设计背景（Why）
/// - 同一段字节可以同时是“HTTP 请求”“带 JSON 正文的消息”“某条 TCP 流上的第 N 条消息”，
///   因此元素上挂的是一组异构切面，而不是一棵继承树；
/// - 每种切面通过本 trait 暴露固定的能力集合，路径查询与配对逻辑只依赖这些能力，不做散落各处的类型判断。
///
/// # 契约说明（What）
/// - [`Facet::children`]：命名、有序、键可重复的子元素；子元素的字节必须来自（或解码自）所属元素的字节；
/// - [`Facet::expects_reply`] / [`Facet::is_reply`]：请求形态与响应形态标记，供配对使用；
/// - [`Facet::on_removed`]：切面被移除后的回调，调用时元素的切面锁已释放，可安全地再次访问元素；
/// - [`Facet::is_content_carrier`]：透明包装节点，路径下降时以其子节点替代自身；
/// - [`Facet::keep_in_final_result`]：返回 `false` 的节点不会出现在查询的最终结果中。
///
/// # 风险提示（Trade-offs）
/// - `children()` 每次调用都会克隆子元素的 `Arc`；切面应在构造时准备好子集合，而不是在此处现算。
pub trait Facet: AsAny + fmt::Debug {
    /// 稳定的切面名称，用于日志与诊断。
    fn name(&self) -> &'static str;

    fn children(&self) -> OrderedMultiMap<Arc<Element>> {
        OrderedMultiMap::new()
    }

    fn expects_reply(&self) -> bool {
        false
    }

    fn is_reply(&self) -> bool {
        false
    }

    fn on_removed(&self, _element: &Element) {}

    fn is_content_carrier(&self) -> bool {
        false
    }

    fn keep_in_final_result(&self) -> bool {
        true
    }
}

/// 为切面提供向具体类型的安全下转型。
///
/// 由覆盖所有 `'static + Send + Sync` 类型的通用实现自动提供，切面作者无需手写。
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// 判断切面对象是否为 `T`。
pub(crate) fn facet_is<T: Facet>(facet: &Arc<dyn Facet>) -> bool {
    AsAny::as_any(&**facet).is::<T>()
}

/// 把切面对象下转型为具体类型，共享同一份分配。
pub(crate) fn downcast_facet<T: Facet>(facet: &Arc<dyn Facet>) -> Option<Arc<T>> {
    if !facet_is::<T>(facet) {
        return None;
    }
    AsAny::into_any_arc(Arc::clone(facet)).downcast::<T>().ok()
}

/// 切面类型的短名称（去掉模块路径），用于错误信息。
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
