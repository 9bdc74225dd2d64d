//! Validation messages returned by the planning service for a snapshot.

use serde::{Deserialize, Serialize};

/// Severity of a validation message. Only `ERROR` blocks convergence;
/// warnings and infos are reported but never corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One message from the validation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub level: Severity,
    pub message: String,
}

impl ValidationMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Severity::Error
    }
}

/// Number of messages at `ERROR` level.
pub fn error_count(messages: &[ValidationMessage]) -> usize {
    messages.iter().filter(|m| m.is_error()).count()
}

/// The first `ERROR`-level message, which is the one the engine corrects
/// this iteration.
pub fn first_error(messages: &[ValidationMessage]) -> Option<&ValidationMessage> {
    messages.iter().find(|m| m.is_error())
}
