//! MIE audit configuration loading and validation.
//!
//! This crate provides:
//! - The audit settings file (JSON or TOML) and `MIE_AUDIT_*` overrides
//! - Settings resolution (CLI → env → XDG → /etc → defaults)
//! - Validation into a [`RedactionPolicy`] and a [`StoreConfig`]
//! - Config snapshots for diagnostics
//!
//! Nothing here is global: callers load a [`LoadedConfig`] once and inject
//! the policy and store configuration where they are needed.

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use resolve::{resolve_settings_path, ConfigSource};
pub use settings::AuditSettings;
pub use snapshot::ConfigSnapshot;
pub use validate::{build_policy, build_store_config, ConfigError, ConfigResult};

use mie_audit::StoreConfig;
use mie_redact::RedactionPolicy;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub policy: RedactionPolicy,
    pub store: StoreConfig,
    pub snapshot: ConfigSnapshot,
}

/// Resolve, read, override from the process environment and validate.
pub fn load_config(cli_path: Option<&Path>) -> ConfigResult<LoadedConfig> {
    load_config_with(cli_path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with(
    cli_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<LoadedConfig> {
    let raw = RawSettings::load(cli_path, &lookup)?;
    let policy = build_policy(&raw.settings)?;
    let store = build_store_config(&raw.settings)?;

    debug!(
        source = %raw.source,
        path = ?raw.path.as_deref(),
        overrides = raw.overrides.len(),
        backend = %store.backend,
        "audit configuration loaded"
    );

    let snapshot = ConfigSnapshot::new(
        raw.path.as_deref(),
        raw.source,
        raw.content.as_deref(),
        &raw.overrides,
        &store,
        &policy,
    );
    Ok(LoadedConfig {
        policy,
        store,
        snapshot,
    })
}

/// Only the store configuration. Read paths that never hash can run
/// without a salt configured.
pub fn load_store_config(cli_path: Option<&Path>) -> ConfigResult<StoreConfig> {
    load_store_config_with(cli_path, |name| std::env::var(name).ok())
}

/// [`load_store_config`] with an explicit environment lookup.
pub fn load_store_config_with(
    cli_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<StoreConfig> {
    let raw = RawSettings::load(cli_path, &lookup)?;
    build_store_config(&raw.settings)
}

struct RawSettings {
    settings: AuditSettings,
    path: Option<PathBuf>,
    source: ConfigSource,
    content: Option<String>,
    overrides: Vec<&'static str>,
}

impl RawSettings {
    fn load(
        cli_path: Option<&Path>,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let (path, source) = resolve::resolve_with(cli_path, lookup);
        let (mut settings, content) = match &path {
            Some(path) => {
                let (settings, content) = AuditSettings::from_file(path)?;
                // Content holding the salt is never hashed into a snapshot.
                let content = settings.hash_salt.is_none().then_some(content);
                (settings, content)
            }
            None => (AuditSettings::default(), None),
        };
        let overrides = settings.apply_overrides(lookup)?;
        Ok(RawSettings {
            settings,
            path,
            source,
            content,
            overrides,
        })
    }
}
