//! Redaction policy configuration.
//!
//! A [`RedactionPolicy`] is an immutable value built through
//! [`RedactionPolicyBuilder`]. Validation happens once, in
//! [`RedactionPolicyBuilder::build`]; a built policy is always usable.

use crate::error::{RedactionError, Result};
use crate::hash::{HashSalt, KeyedHasher, HASH_ALGORITHM};
use crate::CANONICALIZATION_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Schema version for policy summaries.
pub const POLICY_SCHEMA_VERSION: &str = "1.0.0";

/// Default cut-off for string values.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 256;

/// Default cut-off for sequence values.
pub const DEFAULT_MAX_LIST_ITEMS: usize = 50;

/// Default salt generation label.
pub const DEFAULT_HASH_KEY_ID: &str = "k1";

/// Payload keys expected to be non-sensitive: model outcomes and aggregated
/// fairness figures. Request bodies and applicant metadata are not listed.
pub const DEFAULT_ALLOWED_PAYLOAD_KEYS: &[&str] = &[
    "score",
    "decision",
    "reason_codes",
    "base_value",
    "score_from_explanation",
    "positive_label",
    "demographic_parity_difference",
    "equal_opportunity_difference",
    "selection_rate_by_group",
    "tpr_by_group",
    "n_rows",
    "audit_context",
];

/// The default allowlist as a set.
pub fn default_allowed_payload_keys() -> BTreeSet<String> {
    DEFAULT_ALLOWED_PAYLOAD_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

/// What happens to a payload key. Variant order is processing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDisposition {
    /// Value replaced by a keyed hash; key kept.
    Hash,
    /// Key and value kept (subject to bounding).
    Allow,
    /// Unknown key kept because `drop_unknown_keys` is off.
    PassThrough,
    /// Key omitted.
    Drop,
}

/// How the applicant identifier is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantIdHandling {
    /// No applicant reference is stored.
    Remove,
    /// Keyed hash of the identifier.
    Hash,
    /// The raw identifier, unmodified. Explicit opt-out.
    Clear,
}

impl std::fmt::Display for ApplicantIdHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApplicantIdHandling::Remove => "remove",
            ApplicantIdHandling::Hash => "hash",
            ApplicantIdHandling::Clear => "clear",
        };
        write!(f, "{}", s)
    }
}

/// Immutable redaction policy.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    hash_applicant_id: bool,
    remove_applicant_id: bool,
    allowed_payload_keys: BTreeSet<String>,
    hash_payload_keys: BTreeSet<String>,
    drop_unknown_keys: bool,
    max_string_length: usize,
    max_list_items: usize,
    hasher: KeyedHasher,
}

impl RedactionPolicy {
    /// Start building a policy.
    pub fn builder() -> RedactionPolicyBuilder {
        RedactionPolicyBuilder::new()
    }

    pub fn hash_applicant_id(&self) -> bool {
        self.hash_applicant_id
    }

    pub fn remove_applicant_id(&self) -> bool {
        self.remove_applicant_id
    }

    pub fn allowed_payload_keys(&self) -> &BTreeSet<String> {
        &self.allowed_payload_keys
    }

    pub fn hash_payload_keys(&self) -> &BTreeSet<String> {
        &self.hash_payload_keys
    }

    pub fn drop_unknown_keys(&self) -> bool {
        self.drop_unknown_keys
    }

    pub fn max_string_length(&self) -> usize {
        self.max_string_length
    }

    pub fn max_list_items(&self) -> usize {
        self.max_list_items
    }

    pub fn hash_key_id(&self) -> &str {
        self.hasher.key_id()
    }

    pub(crate) fn hasher(&self) -> &KeyedHasher {
        &self.hasher
    }

    /// Effective applicant id handling. `remove` wins over `hash`.
    pub fn applicant_id_handling(&self) -> ApplicantIdHandling {
        applicant_handling(self.remove_applicant_id, self.hash_applicant_id)
    }

    /// Whether any hashing can happen under this policy.
    pub fn hashing_enabled(&self) -> bool {
        self.applicant_id_handling() == ApplicantIdHandling::Hash
            || !self.hash_payload_keys.is_empty()
    }

    /// Disposition of a payload key. Hashing wins over allow-listing.
    pub fn disposition(&self, key: &str) -> KeyDisposition {
        if self.hash_payload_keys.contains(key) {
            KeyDisposition::Hash
        } else if self.allowed_payload_keys.contains(key) {
            KeyDisposition::Allow
        } else if self.drop_unknown_keys {
            KeyDisposition::Drop
        } else {
            KeyDisposition::PassThrough
        }
    }

    /// Keys that are both hashed and allow-listed (hashed; listed for diagnostics).
    pub fn overlapping_keys(&self) -> impl Iterator<Item = &str> {
        self.hash_payload_keys
            .intersection(&self.allowed_payload_keys)
            .map(String::as_str)
    }

    /// Diagnostic summary. Contains no secret material.
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            schema_version: POLICY_SCHEMA_VERSION.to_string(),
            hash_algorithm: HASH_ALGORITHM.to_string(),
            hash_key_id: self.hasher.key_id().to_string(),
            salt_configured: self.hasher.has_salt(),
            canonicalization_version: CANONICALIZATION_VERSION.to_string(),
            hash_applicant_id: self.hash_applicant_id,
            remove_applicant_id: self.remove_applicant_id,
            applicant_id_handling: self.applicant_id_handling(),
            allowed_payload_keys: self.allowed_payload_keys.iter().cloned().collect(),
            hash_payload_keys: self.hash_payload_keys.iter().cloned().collect(),
            drop_unknown_keys: self.drop_unknown_keys,
            max_string_length: self.max_string_length,
            max_list_items: self.max_list_items,
        }
    }
}

fn applicant_handling(remove: bool, hash: bool) -> ApplicantIdHandling {
    if remove {
        ApplicantIdHandling::Remove
    } else if hash {
        ApplicantIdHandling::Hash
    } else {
        ApplicantIdHandling::Clear
    }
}

/// Serializable view of a policy for health checks and `policy show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub schema_version: String,
    pub hash_algorithm: String,
    pub hash_key_id: String,
    pub salt_configured: bool,
    pub canonicalization_version: String,
    pub hash_applicant_id: bool,
    pub remove_applicant_id: bool,
    pub applicant_id_handling: ApplicantIdHandling,
    pub allowed_payload_keys: Vec<String>,
    pub hash_payload_keys: Vec<String>,
    pub drop_unknown_keys: bool,
    pub max_string_length: usize,
    pub max_list_items: usize,
}

/// Builder for [`RedactionPolicy`].
///
/// Defaults fail closed: no allow-listed keys, unknown keys dropped,
/// applicant ids hashed.
#[derive(Debug, Clone)]
pub struct RedactionPolicyBuilder {
    hash_applicant_id: bool,
    remove_applicant_id: bool,
    allowed_payload_keys: BTreeSet<String>,
    hash_payload_keys: BTreeSet<String>,
    drop_unknown_keys: bool,
    max_string_length: usize,
    max_list_items: usize,
    hash_salt: HashSalt,
    hash_key_id: String,
}

impl Default for RedactionPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionPolicyBuilder {
    pub fn new() -> Self {
        Self {
            hash_applicant_id: true,
            remove_applicant_id: false,
            allowed_payload_keys: BTreeSet::new(),
            hash_payload_keys: BTreeSet::new(),
            drop_unknown_keys: true,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            max_list_items: DEFAULT_MAX_LIST_ITEMS,
            hash_salt: HashSalt::new(""),
            hash_key_id: DEFAULT_HASH_KEY_ID.to_string(),
        }
    }

    pub fn hash_applicant_id(mut self, enabled: bool) -> Self {
        self.hash_applicant_id = enabled;
        self
    }

    pub fn remove_applicant_id(mut self, enabled: bool) -> Self {
        self.remove_applicant_id = enabled;
        self
    }

    pub fn allowed_payload_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_payload_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn hash_payload_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hash_payload_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn drop_unknown_keys(mut self, enabled: bool) -> Self {
        self.drop_unknown_keys = enabled;
        self
    }

    pub fn max_string_length(mut self, max: usize) -> Self {
        self.max_string_length = max;
        self
    }

    pub fn max_list_items(mut self, max: usize) -> Self {
        self.max_list_items = max;
        self
    }

    pub fn hash_salt(mut self, salt: HashSalt) -> Self {
        self.hash_salt = salt;
        self
    }

    pub fn hash_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.hash_key_id = key_id.into();
        self
    }

    /// Validate and build the policy.
    ///
    /// # Errors
    ///
    /// [`RedactionError::Configuration`] when the salt is missing while hashing
    /// is enabled, the key id is malformed, or a key name is empty.
    pub fn build(self) -> Result<RedactionPolicy> {
        validate_key_id(&self.hash_key_id)?;

        for (set_name, keys) in [
            ("allowed_payload_keys", &self.allowed_payload_keys),
            ("hash_payload_keys", &self.hash_payload_keys),
        ] {
            if keys.iter().any(|k| k.trim().is_empty()) {
                return Err(RedactionError::configuration(format!(
                    "{} contains an empty key",
                    set_name
                )));
            }
        }

        let handling = applicant_handling(self.remove_applicant_id, self.hash_applicant_id);
        let hashing_enabled =
            handling == ApplicantIdHandling::Hash || !self.hash_payload_keys.is_empty();
        if hashing_enabled && self.hash_salt.is_empty() {
            return Err(RedactionError::configuration(
                "hash_salt must be non-empty when hashing is enabled \
                 (hash_applicant_id or hash_payload_keys)",
            ));
        }

        if self.remove_applicant_id && self.hash_applicant_id {
            debug!("remove_applicant_id and hash_applicant_id both set; remove wins");
        }
        let overlap = self
            .hash_payload_keys
            .intersection(&self.allowed_payload_keys)
            .count();
        if overlap > 0 {
            debug!(overlap, "keys both hashed and allow-listed are hashed");
        }
        if handling == ApplicantIdHandling::Clear {
            warn!("applicant identifiers will be stored unmodified (hash_applicant_id=false)");
        }

        Ok(RedactionPolicy {
            hash_applicant_id: self.hash_applicant_id,
            remove_applicant_id: self.remove_applicant_id,
            allowed_payload_keys: self.allowed_payload_keys,
            hash_payload_keys: self.hash_payload_keys,
            drop_unknown_keys: self.drop_unknown_keys,
            max_string_length: self.max_string_length,
            max_list_items: self.max_list_items,
            hasher: KeyedHasher::new(self.hash_salt, self.hash_key_id),
        })
    }
}

fn validate_key_id(key_id: &str) -> Result<()> {
    if key_id.is_empty() {
        return Err(RedactionError::configuration("hash_key_id must not be empty"));
    }
    if key_id
        .chars()
        .any(|c| c == ':' || c == ']' || c.is_whitespace())
    {
        return Err(RedactionError::configuration(
            "hash_key_id must not contain ':', ']' or whitespace",
        ));
    }
    Ok(())
}
