//! Audit settings file and environment overrides.
//!
//! The settings file is JSON, or TOML when its extension is `.toml`. Every
//! option is optional; `MIE_AUDIT_*` environment variables override
//! individual options after the file is read.

use crate::validate::{ConfigError, ConfigResult};
use mie_audit::StoreBackend;
use mie_redact::HashSalt;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_BACKEND: &str = "MIE_AUDIT_BACKEND";
pub const ENV_PATH: &str = "MIE_AUDIT_PATH";
pub const ENV_ALLOW_PAYLOAD_KEYS: &str = "MIE_AUDIT_ALLOW_PAYLOAD_KEYS";
pub const ENV_HASH_PAYLOAD_KEYS: &str = "MIE_AUDIT_HASH_PAYLOAD_KEYS";
pub const ENV_DROP_UNKNOWN_PAYLOAD_KEYS: &str = "MIE_AUDIT_DROP_UNKNOWN_PAYLOAD_KEYS";
pub const ENV_REMOVE_APPLICANT_ID: &str = "MIE_AUDIT_REMOVE_APPLICANT_ID";
pub const ENV_HASH_APPLICANT_ID: &str = "MIE_AUDIT_HASH_APPLICANT_ID";
pub const ENV_HASH_SALT: &str = "MIE_AUDIT_HASH_SALT";
pub const ENV_HASH_KEY_ID: &str = "MIE_AUDIT_HASH_KEY_ID";
pub const ENV_TRUNCATE_PAYLOAD_STRINGS: &str = "MIE_AUDIT_TRUNCATE_PAYLOAD_STRINGS";
pub const ENV_MAX_LIST_ITEMS: &str = "MIE_AUDIT_MAX_LIST_ITEMS";

/// Every environment variable that overrides a setting.
pub const ENV_OVERRIDES: &[&str] = &[
    ENV_BACKEND,
    ENV_PATH,
    ENV_ALLOW_PAYLOAD_KEYS,
    ENV_HASH_PAYLOAD_KEYS,
    ENV_DROP_UNKNOWN_PAYLOAD_KEYS,
    ENV_REMOVE_APPLICANT_ID,
    ENV_HASH_APPLICANT_ID,
    ENV_HASH_SALT,
    ENV_HASH_KEY_ID,
    ENV_TRUNCATE_PAYLOAD_STRINGS,
    ENV_MAX_LIST_ITEMS,
];

/// Raw audit settings as written by an operator.
///
/// Deliberately not `Serialize`: it can hold the hash salt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditSettings {
    /// Storage backend: `log` or `indexed`.
    #[serde(default)]
    pub backend: Option<StoreBackend>,

    /// Store file path.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Unset means the default allowlist.
    #[serde(default)]
    pub allow_payload_keys: Option<Vec<String>>,

    #[serde(default)]
    pub hash_payload_keys: Option<Vec<String>>,

    #[serde(default)]
    pub drop_unknown_payload_keys: Option<bool>,

    #[serde(default)]
    pub remove_applicant_id: Option<bool>,

    #[serde(default)]
    pub hash_applicant_id: Option<bool>,

    #[serde(default)]
    pub hash_salt: Option<HashSalt>,

    #[serde(default)]
    pub hash_key_id: Option<String>,

    /// Signed so negative values reach validation instead of a parse error.
    #[serde(default)]
    pub truncate_payload_strings: Option<i64>,

    #[serde(default)]
    pub max_list_items: Option<i64>,
}

impl AuditSettings {
    /// Load settings from a file. Returns the settings and the raw content.
    pub fn from_file(path: &Path) -> ConfigResult<(Self, String)> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(path, &content)?;
        Ok((settings, content))
    }

    fn parse(path: &Path, content: &str) -> ConfigResult<Self> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Apply overrides looked up through `lookup`. Returns the names of the
    /// variables that were applied.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Vec<&'static str>> {
        let mut applied = Vec::new();
        for &name in ENV_OVERRIDES {
            let Some(raw) = lookup(name) else {
                continue;
            };
            match name {
                ENV_BACKEND => {
                    self.backend = Some(
                        raw.parse::<StoreBackend>()
                            .map_err(|message| ConfigError::invalid(name, message))?,
                    )
                }
                ENV_PATH => self.path = Some(PathBuf::from(raw)),
                ENV_ALLOW_PAYLOAD_KEYS => self.allow_payload_keys = Some(parse_list(name, &raw)?),
                ENV_HASH_PAYLOAD_KEYS => self.hash_payload_keys = Some(parse_list(name, &raw)?),
                ENV_DROP_UNKNOWN_PAYLOAD_KEYS => {
                    self.drop_unknown_payload_keys = Some(parse_bool(name, &raw)?)
                }
                ENV_REMOVE_APPLICANT_ID => self.remove_applicant_id = Some(parse_bool(name, &raw)?),
                ENV_HASH_APPLICANT_ID => self.hash_applicant_id = Some(parse_bool(name, &raw)?),
                ENV_HASH_SALT => self.hash_salt = Some(HashSalt::new(raw)),
                ENV_HASH_KEY_ID => self.hash_key_id = Some(raw),
                ENV_TRUNCATE_PAYLOAD_STRINGS => {
                    self.truncate_payload_strings = Some(parse_int(name, &raw)?)
                }
                ENV_MAX_LIST_ITEMS => self.max_list_items = Some(parse_int(name, &raw)?),
                _ => continue,
            }
            applied.push(name);
        }
        Ok(applied)
    }
}

fn parse_bool(name: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(
            name,
            format!("expected a boolean, got {other:?}"),
        )),
    }
}

fn parse_int(name: &str, raw: &str) -> ConfigResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, format!("expected an integer, got {raw:?}")))
}

/// A JSON array of strings, or a comma separated list.
fn parse_list(name: &str, raw: &str) -> ConfigResult<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::invalid(name, format!("expected a JSON string array: {e}")));
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect())
}
