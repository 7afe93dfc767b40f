//! Configuration snapshots for diagnostics.
//!
//! A snapshot records which settings file was used, its content hash, the
//! environment overrides applied and the effective policy summary. The hash
//! salt never appears in a snapshot.

use chrono::{DateTime, Utc};
use mie_audit::StoreConfig;
use mie_redact::{PolicySummary, RedactionPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::ConfigSource;

/// A frozen view of the effective configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// Path the settings were loaded from.
    #[serde(default)]
    pub settings_path: Option<String>,

    pub settings_source: String,

    /// SHA-256 of the settings file content. Absent when there is no file
    /// or the file sets `hash_salt`.
    #[serde(default)]
    pub settings_hash: Option<String>,

    /// Environment variables that overrode file settings (names only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_overrides: Vec<String>,

    pub store: StoreConfig,

    pub policy: PolicySummary,
}

impl ConfigSnapshot {
    pub fn new(
        settings_path: Option<&std::path::Path>,
        source: ConfigSource,
        settings_content: Option<&str>,
        env_overrides: &[&str],
        store: &StoreConfig,
        policy: &RedactionPolicy,
    ) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            settings_path: settings_path.map(|p| p.display().to_string()),
            settings_source: source.to_string(),
            settings_hash: settings_content.map(hash_content),
            env_overrides: env_overrides.iter().map(|s| s.to_string()).collect(),
            store: store.clone(),
            policy: policy.summary(),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a short identifier for the settings content (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        match (&self.settings_hash, &self.settings_path) {
            (Some(hash), _) => &hash[..12.min(hash.len())],
            (None, Some(_)) => "unhashed",
            (None, None) => "defaults",
        }
    }
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mie_audit::StoreBackend;
    use mie_redact::HashSalt;

    fn policy() -> RedactionPolicy {
        RedactionPolicy::builder()
            .hash_salt(HashSalt::new("snapshot-secret"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_hash_content() {
        let hash1 = hash_content("test");
        assert_eq!(hash1, hash_content("test"));
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_snapshot_never_contains_salt() {
        let store = StoreConfig::new(StoreBackend::Log, "/tmp/audit.jsonl");
        let snapshot = ConfigSnapshot::new(
            None,
            ConfigSource::Environment,
            Some(r#"{"hash_salt":"snapshot-secret"}"#),
            &["MIE_AUDIT_HASH_SALT"],
            &store,
            &policy(),
        );
        let json = snapshot.to_json().unwrap();
        assert!(!json.contains("snapshot-secret"));
        assert!(json.contains("MIE_AUDIT_HASH_SALT"));
        assert!(snapshot.policy.salt_configured);
        assert_eq!(snapshot.short_id().len(), 12);
    }

    #[test]
    fn test_defaults_short_id() {
        let store = StoreConfig::new(StoreBackend::Log, "/tmp/audit.jsonl");
        let snapshot =
            ConfigSnapshot::new(None, ConfigSource::BuiltinDefault, None, &[], &store, &policy());
        assert_eq!(snapshot.short_id(), "defaults");
        assert_eq!(snapshot.settings_source, "builtin default");
    }

    #[test]
    fn test_file_without_hash_short_id() {
        let store = StoreConfig::new(StoreBackend::Log, "/tmp/audit.jsonl");
        let snapshot = ConfigSnapshot::new(
            Some(std::path::Path::new("/etc/mie/audit.json")),
            ConfigSource::CliArgument,
            None,
            &[],
            &store,
            &policy(),
        );
        assert_eq!(snapshot.short_id(), "unhashed");
    }
}
