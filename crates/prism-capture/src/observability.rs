//! 日志安装：`tracing-subscriber` 的 `fmt` 层加 `EnvFilter`。
//!
//! # 教案式说明
//! - **意图（Why）**：库代码只发出 `tracing` 事件，订阅器由可执行程序在启动时安装一次；
//! - **契约（What）**：`RUST_LOG` 存在时优先使用，否则使用传入的过滤指令；重复安装或外部已设置全局订阅器时
//!   返回 [`CaptureError::LoggingInstalled`]，绝不 panic；
//! - **实现（How）**：`OnceLock` 记录安装状态，`dispatcher::has_been_set` 检测外部订阅器。

use std::sync::OnceLock;

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::CaptureError;

static INSTALLED: OnceLock<String> = OnceLock::new();

/// 安装全局日志订阅器。
pub fn install(filter: &str) -> Result<(), CaptureError> {
    if INSTALLED.get().is_some() {
        return Err(CaptureError::LoggingInstalled("prism logging is already installed"));
    }
    if dispatcher::has_been_set() {
        return Err(CaptureError::LoggingInstalled("another global subscriber is already set"));
    }
    let env_filter = build_env_filter(filter)?;
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| CaptureError::LoggingInstalled("another global subscriber is already set"))?;
    INSTALLED
        .set(filter.to_owned())
        .map_err(|_| CaptureError::LoggingInstalled("prism logging is already installed"))
}

/// 已安装时返回安装所用的过滤指令。
pub fn installed_filter() -> Option<&'static str> {
    INSTALLED.get().map(String::as_str)
}

fn build_env_filter(filter: &str) -> Result<EnvFilter, CaptureError> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    EnvFilter::try_new(filter).map_err(|error| CaptureError::LogFilter {
        filter: filter.to_owned(),
        detail: error.to_string(),
    })
}
