use std::fmt;

use crate::Facet;

/// 标记元素内容不得被转发或持久化。
#[derive(Clone, Copy, Debug, Default)]
pub struct NonTransmissionFacet;

impl Facet for NonTransmissionFacet {
    fn name(&self) -> &'static str {
        "non_transmission"
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoteSeverity {
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for NoteSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoteSeverity::Info => "info",
            NoteSeverity::Warn => "warn",
            NoteSeverity::Error => "error",
        })
    }
}

/// 附着在元素上的人类可读注释，例如解码器放弃时留下的原因。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteFacet {
    text: String,
    severity: NoteSeverity,
}

impl NoteFacet {
    pub fn new(severity: NoteSeverity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn severity(&self) -> NoteSeverity {
        self.severity
    }
}

impl Facet for NoteFacet {
    fn name(&self) -> &'static str {
        "note"
    }
}
