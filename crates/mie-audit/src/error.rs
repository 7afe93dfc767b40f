//! Error types for the audit store.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for audit store operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors that can occur while appending to or reading from an audit store.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to resolve audit data directory (set MIE_DATA or XDG_DATA_HOME)")]
    DataDirUnavailable,

    /// A durable write failed. Nothing from the failed append is visible.
    #[error("audit write failed at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A previous write failed and could not be rolled back; the store
    /// refuses further appends until it is reopened.
    #[error("audit store at {path} is poisoned by an unrecoverable write failure")]
    Poisoned { path: PathBuf },

    #[error("audit read failed at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse audit event at {path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize audit event: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid event type {tag:?}: {reason}")]
    InvalidEventType { tag: String, reason: String },

    #[error("audit integrity check failed: {message}")]
    Integrity { message: String },

    #[error("audit store lock poisoned")]
    LockPoisoned,
}

impl AuditError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditError::Read {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the durable write path.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, AuditError::Write { .. } | AuditError::Poisoned { .. })
    }
}
