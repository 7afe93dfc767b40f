//! Error types for the redaction engine.

use thiserror::Error;

/// Result type for redaction operations.
pub type Result<T> = std::result::Result<T, RedactionError>;

/// Errors that can occur while building a policy or redacting a payload.
///
/// Messages name keys and settings, never payload values or identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedactionError {
    /// The policy is invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The payload contains a structure the redactor cannot bound.
    /// The originating request fails and nothing is written.
    #[error("payload shape error at key '{key}': {reason}")]
    PayloadShape { key: String, reason: String },
}

impl RedactionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        RedactionError::Configuration(message.into())
    }

    pub(crate) fn shape(key: &str, reason: impl Into<String>) -> Self {
        RedactionError::PayloadShape {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a configuration problem (as opposed to a per-event rejection).
    pub fn is_configuration(&self) -> bool {
        matches!(self, RedactionError::Configuration(_))
    }
}
