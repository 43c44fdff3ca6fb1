use std::sync::Arc;

use crate::{CoreError, Element};

/// 外部注入的布尔谓词能力。
///
/// # 契约说明（What）
/// - 表达式语法完全由实现方定义，查询引擎只保证：同一 `?(…)` 内容会针对每个候选子节点调用一次；
/// - 实现必须对相同的上下文给出确定结果；
/// - 返回的错误会原样终止本次查询，推荐使用 [`CoreError::Predicate`]。
///
/// 闭包 `Fn(&str, &PredicateContext<'_>) -> Result<bool, CoreError>` 自动实现本 trait。
pub trait PredicateEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &PredicateContext<'_>) -> Result<bool, CoreError>;
}

impl<F> PredicateEvaluator for F
where
    F: Fn(&str, &PredicateContext<'_>) -> Result<bool, CoreError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, context: &PredicateContext<'_>) -> Result<bool, CoreError> {
        self(expression, context)
    }
}

/// 谓词求值时可见的上下文。
#[derive(Clone, Debug)]
pub struct PredicateContext<'a> {
    /// 正在被判断的候选节点。
    pub element: &'a Arc<Element>,
    /// 候选节点在父节点中的键。
    pub key: &'a str,
    /// 候选节点的父节点（即选择器所作用的节点）。
    pub parent: &'a Arc<Element>,
    /// 查询的起点（`$`）。
    pub current: &'a Arc<Element>,
    /// 起点所在的顶层消息。
    pub message: Option<&'a Arc<Element>>,
    /// 消息所在请求/响应对的请求一侧。
    pub request: Option<&'a Arc<Element>>,
    /// 消息所在请求/响应对的响应一侧。
    pub response: Option<&'a Arc<Element>>,
}
