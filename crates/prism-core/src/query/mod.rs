//! 路径查询引擎：类 JSONPath 的表达式在元素树上的求值。
//!
//! # 模块定位（Why）
//! - 断言代码需要在事后定位任意深度的字段，例如 `$.header.'Content-Type'`、`$..'kid'`、
//!   `$.body[?(@.value == 'x')]`；
//! - 引擎本身无状态，解析与执行分离：[`PathQuery`] 可以解析一次、对多条消息重复执行。
//!
//! # 语法概要（What）
//! - 路径以 `$`（查询起点）开头；谓词求值器内部使用的相对路径可以用 `@` 开头（[`PathQuery::parse_relative`]）；
//! - 段以 `.` 分隔，引号与方括号保护其中的 `.`；
//! - 末尾空段为恒等，中间空段（`..`）为“自身 + 全部后代”；
//! - `*` 选全部子节点；裸名或 `'带引号的名'` 精确匹配键；
//! - `[n]`、`['a'|~'b']`、`[*]`、`[?(expr)]` 作用于候选的子节点，字面量先做 URL 解码，`~` 表示大小写无关。
//!
//! # 执行逻辑（How）
//! 每一段把候选列表映射为新列表，随后对透明包装节点做下降、按身份稳定去重；
//! 候选为空时立即返回空结果；最终结果剔除声明自身不出现在结果中的节点。

mod executor;
mod parser;
mod predicate;
mod selector;

use std::sync::Arc;

use crate::{CoreError, Element};

pub use predicate::{PredicateContext, PredicateEvaluator};
pub use selector::url_decode;

use selector::Step;

/// 已解析的路径表达式。
#[derive(Clone, Debug)]
pub struct PathQuery {
    source: String,
    steps: Vec<Step>,
}

impl PathQuery {
    /// 解析以 `$` 开头的路径。
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        Ok(Self {
            source: path.to_owned(),
            steps: parser::parse_steps(path, false)?,
        })
    }

    /// 解析相对路径：额外接受以 `@` 开头，`@` 与 `$` 都指向执行时传入的起点。
    pub fn parse_relative(path: &str) -> Result<Self, CoreError> {
        Ok(Self {
            source: path.to_owned(),
            steps: parser::parse_steps(path, true)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_predicate(&self) -> bool {
        self.steps.iter().any(|step| step.predicates().next().is_some())
    }

    /// 以 `current` 为起点执行查询。
    ///
    /// 查询包含谓词而 `evaluator` 为 `None` 时，在执行任何一步之前返回 [`CoreError::Predicate`]。
    pub fn execute(
        &self,
        current: &Arc<Element>,
        evaluator: Option<&dyn PredicateEvaluator>,
    ) -> Result<Vec<Arc<Element>>, CoreError> {
        if evaluator.is_none() {
            if let Some(expression) = self.steps.iter().flat_map(Step::predicates).next() {
                return Err(executor::missing_evaluator(expression));
            }
        }
        executor::run(&self.steps, current, evaluator)
    }
}
