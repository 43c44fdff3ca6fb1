//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为元素树、路径查询与转换管线提供统一的错误域，所有上层 crate 直接以 `?` 传播 [`CoreError`]；
//! - 每个变体都携带足以定位问题的上下文（元素编号、路径文本、插件名），满足“人可以据此找到出问题的消息”。
//!
//! ## 设计要求（What）
//! - 派生 `thiserror::Error`，兼容 `std::error::Error` 生态；
//! - [`CoreError::code`] 返回 `<域>.<语义>` 形式的稳定错误码，供日志与断言使用；
//! - 插件失败（[`CoreError::Plugin`]）是唯一在本地被吸收的类别，其余一律交由调用方决策。

use std::time::Duration;

use prism_buffer::BufferError;
use thiserror::Error;

use crate::ElementId;

/// 核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把字节越界、切面缺失、查询语法、等待超时/取消、插件与注册表失败收拢到同一枚举，
///   避免各 crate 自造错误类型后再层层转换。
/// - **契约 (What)**：所有变体均为 `Send + Sync + 'static`；`code()` 在版本间保持稳定。
/// - **风险 (Trade-offs)**：上下文使用 `String` 保存，牺牲少量分配换取可读性。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// 字节区域越界，来自 `prism-buffer`。
    #[error(transparent)]
    OutOfRange(#[from] BufferError),

    /// 调用方通过 `*_or_fail` 访问器要求的切面不存在。
    #[error("element {element} has no facet of type `{facet}`")]
    MissingFacet {
        element: ElementId,
        facet: &'static str,
    },

    /// 路径表达式语法错误；查询不会被部分执行。
    #[error("malformed path `{path}`: {reason}")]
    MalformedPath { path: String, reason: String },

    /// 谓词求值失败，或查询包含谓词却没有注入求值器。
    #[error("predicate `{expression}` failed: {detail}")]
    Predicate { expression: String, detail: String },

    /// 调用方设定的等待期限已到，元素仍未完成解析。
    #[error("element {element} was not parsed within {waited:?}")]
    Timeout { element: ElementId, waited: Duration },

    /// 管线被中断关闭，等待者观察到取消。
    #[error("waiting for element {element} was cancelled")]
    Cancelled { element: ElementId },

    /// 消息已经进入历史（已提交或已转换），不能再次转换。
    #[error("element {element} was already submitted for conversion")]
    AlreadySubmitted { element: ElementId },

    /// 单个插件处理某元素时失败。
    #[error("plugin `{plugin}` failed: {detail}")]
    Plugin { plugin: String, detail: String },

    /// 插件注册表校验失败（重复封存后注册、依赖缺失或顺序冲突）。
    #[error("plugin registry rejected configuration: {detail}")]
    Registry { detail: String },
}

impl CoreError {
    /// 稳定错误码，遵循 `<域>.<语义>` 约定。
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::OutOfRange(inner) => inner.code(),
            CoreError::MissingFacet { .. } => "tree.missing_facet",
            CoreError::MalformedPath { .. } => "query.malformed_path",
            CoreError::Predicate { .. } => "query.predicate",
            CoreError::Timeout { .. } => "pipeline.timeout",
            CoreError::Cancelled { .. } => "pipeline.cancelled",
            CoreError::AlreadySubmitted { .. } => "pipeline.already_submitted",
            CoreError::Plugin { .. } => "pipeline.plugin",
            CoreError::Registry { .. } => "pipeline.registry",
        }
    }

    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        CoreError::MalformedPath {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }

    /// 便于插件作者把任意可显示的失败包装为插件错误。
    pub fn plugin(plugin: impl Into<String>, detail: impl ToString) -> Self {
        CoreError::Plugin {
            plugin: plugin.into(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_errors_keep_their_code() {
        let err = CoreError::from(BufferError::OutOfRange {
            from: 3,
            to: 9,
            len: 4,
        });
        assert_eq!(err.code(), "buffer.out_of_range");
        assert!(err.to_string().contains("[3, 9)"));
    }

    #[test]
    fn missing_facet_names_the_element() {
        let err = CoreError::MissingFacet {
            element: ElementId::from_index(7),
            facet: "HttpRequestFacet",
        };
        assert_eq!(err.code(), "tree.missing_facet");
        assert_eq!(
            err.to_string(),
            "element #7 has no facet of type `HttpRequestFacet`"
        );
    }
}
