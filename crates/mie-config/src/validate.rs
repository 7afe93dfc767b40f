//! Configuration errors and semantic validation.

use crate::settings::AuditSettings;
use mie_audit::{resolve_default_path, AuditError, StoreConfig};
use mie_redact::{default_allowed_payload_keys, RedactionError, RedactionPolicy};
use std::path::PathBuf;
use thiserror::Error;

/// Validation result type.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors. Never carry the hash salt.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error(transparent)]
    Redaction(#[from] RedactionError),

    #[error("cannot resolve default audit store path: {0}")]
    StorePath(#[from] AuditError),
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io { .. } => 60,
            ConfigError::Parse { .. } => 61,
            ConfigError::InvalidValue { .. } => 65,
            ConfigError::Redaction(_) => 67,
            ConfigError::StorePath(_) => 68,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Build the redaction policy described by `settings`.
///
/// Unset options take the platform defaults; an unset allowlist means the
/// default allowlist, while an explicitly empty one allows nothing.
pub fn build_policy(settings: &AuditSettings) -> ConfigResult<RedactionPolicy> {
    let allowed = match &settings.allow_payload_keys {
        Some(keys) => keys.iter().cloned().collect(),
        None => default_allowed_payload_keys(),
    };

    let mut builder = RedactionPolicy::builder()
        .allowed_payload_keys(allowed)
        .hash_payload_keys(settings.hash_payload_keys.iter().flatten().cloned())
        .drop_unknown_keys(settings.drop_unknown_payload_keys.unwrap_or(true))
        .remove_applicant_id(settings.remove_applicant_id.unwrap_or(false))
        .hash_applicant_id(settings.hash_applicant_id.unwrap_or(true));

    if let Some(max) = settings.truncate_payload_strings {
        builder = builder.max_string_length(non_negative("truncate_payload_strings", max)?);
    }
    if let Some(max) = settings.max_list_items {
        builder = builder.max_list_items(non_negative("max_list_items", max)?);
    }
    if let Some(salt) = &settings.hash_salt {
        builder = builder.hash_salt(salt.clone());
    }
    if let Some(key_id) = &settings.hash_key_id {
        builder = builder.hash_key_id(key_id.clone());
    }

    Ok(builder.build()?)
}

/// Build the store configuration described by `settings`.
pub fn build_store_config(settings: &AuditSettings) -> ConfigResult<StoreConfig> {
    let path = match &settings.path {
        Some(path) => path.clone(),
        None => resolve_default_path()?,
    };
    Ok(StoreConfig::new(settings.backend.unwrap_or_default(), path))
}

fn non_negative(field: &str, value: i64) -> ConfigResult<usize> {
    usize::try_from(value).map_err(|_| {
        ConfigError::Redaction(RedactionError::Configuration(format!(
            "{field} must be a non-negative integer, got {value}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mie_redact::{HashSalt, DEFAULT_MAX_LIST_ITEMS, DEFAULT_MAX_STRING_LENGTH};

    fn salted() -> AuditSettings {
        AuditSettings {
            hash_salt: Some(HashSalt::new("validate-test")),
            ..AuditSettings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let policy = build_policy(&salted()).unwrap();
        assert_eq!(policy.allowed_payload_keys(), &default_allowed_payload_keys());
        assert!(policy.hash_payload_keys().is_empty());
        assert!(policy.drop_unknown_keys());
        assert!(policy.hash_applicant_id());
        assert!(!policy.remove_applicant_id());
        assert_eq!(policy.max_string_length(), DEFAULT_MAX_STRING_LENGTH);
        assert_eq!(policy.max_list_items(), DEFAULT_MAX_LIST_ITEMS);
    }

    #[test]
    fn test_explicit_empty_allowlist_allows_nothing() {
        let settings = AuditSettings {
            allow_payload_keys: Some(Vec::new()),
            ..salted()
        };
        assert!(build_policy(&settings).unwrap().allowed_payload_keys().is_empty());
    }

    #[test]
    fn test_negative_bounds_rejected() {
        for settings in [
            AuditSettings {
                truncate_payload_strings: Some(-1),
                ..salted()
            },
            AuditSettings {
                max_list_items: Some(-5),
                ..salted()
            },
        ] {
            let err = build_policy(&settings).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Redaction(RedactionError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_missing_salt_is_configuration_error() {
        let err = build_policy(&AuditSettings::default()).unwrap_err();
        match err {
            ConfigError::Redaction(e) => assert!(e.is_configuration()),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_salt_needed_when_nothing_hashed() {
        let settings = AuditSettings {
            hash_applicant_id: Some(false),
            remove_applicant_id: Some(true),
            ..AuditSettings::default()
        };
        assert!(build_policy(&settings).is_ok());
    }

    #[test]
    fn test_store_config_uses_explicit_path() {
        let settings = AuditSettings {
            path: Some(PathBuf::from("/tmp/mie/audit.jsonl")),
            backend: Some(mie_audit::StoreBackend::Indexed),
            ..AuditSettings::default()
        };
        let store = build_store_config(&settings).unwrap();
        assert_eq!(store.path, PathBuf::from("/tmp/mie/audit.jsonl"));
        assert_eq!(store.backend, mie_audit::StoreBackend::Indexed);
    }
}
