//! Main redaction engine.
//!
//! The [`Redactor`] applies a [`RedactionPolicy`] to a payload: it resolves
//! the applicant reference, decides per key whether to hash, keep or drop,
//! and bounds every surviving value. It has no side effects beyond computing
//! keyed hashes and retains nothing from the input.

use crate::canonicalize::canonical_string;
use crate::error::{RedactionError, Result};
use crate::policy::{ApplicantIdHandling, KeyDisposition, RedactionPolicy};
use crate::value::{Payload, PayloadValue, RedactedPayload, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Appended to strings cut at `max_string_length`.
pub const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Prefix of the element appended to sequences cut at `max_list_items`.
/// The full marker is `[CLIPPED:<omitted item count>]`.
pub const CLIP_MARKER_PREFIX: &str = "[CLIPPED:";

/// Which keys were altered by a redaction. Never contains values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionReport {
    /// How the applicant identifier was handled.
    pub applicant_id_handling: ApplicantIdHandling,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashed_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub truncated_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clipped_keys: Vec<String>,
}

impl RedactionReport {
    fn new(applicant_id_handling: ApplicantIdHandling) -> Self {
        Self {
            applicant_id_handling,
            hashed_keys: Vec::new(),
            dropped_keys: Vec::new(),
            truncated_keys: Vec::new(),
            clipped_keys: Vec::new(),
        }
    }

    /// Whether any payload value was altered or removed.
    pub fn payload_modified(&self) -> bool {
        !(self.hashed_keys.is_empty()
            && self.dropped_keys.is_empty()
            && self.truncated_keys.is_empty()
            && self.clipped_keys.is_empty())
    }
}

/// Result of a redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionOutcome {
    /// The safe payload.
    pub payload: RedactedPayload,
    /// Hashed (or, on explicit opt-out, raw) applicant identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_ref: Option<String>,
    /// What was altered.
    pub report: RedactionReport,
}

/// The redaction engine. Owns its policy; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Redactor {
    policy: RedactionPolicy,
}

impl Redactor {
    pub fn new(policy: RedactionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RedactionPolicy {
        &self.policy
    }

    /// Redact a validated payload.
    ///
    /// Keys are processed in policy priority order (hashed, allowed,
    /// pass-through, dropped; lexicographic within each class) and the output
    /// map is sorted, so the result does not depend on the caller's key order.
    pub fn redact(&self, raw: &Payload, applicant_id: Option<&str>) -> RedactionOutcome {
        let mut report = RedactionReport::new(self.policy.applicant_id_handling());
        let applicant_ref = self.applicant_ref(applicant_id);

        let mut ordered: Vec<(KeyDisposition, &String, &PayloadValue)> = raw
            .iter()
            .map(|(key, value)| (self.policy.disposition(key), key, value))
            .collect();
        ordered.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut safe = BTreeMap::new();
        for (disposition, key, value) in ordered {
            let value = match disposition {
                KeyDisposition::Hash => {
                    report.hashed_keys.push(key.clone());
                    PayloadValue::from(self.policy.hasher().hash(&canonical_string(value)))
                }
                KeyDisposition::Allow | KeyDisposition::PassThrough => value.clone(),
                KeyDisposition::Drop => {
                    report.dropped_keys.push(key.clone());
                    continue;
                }
            };
            let bounded = self.bound(key, value, &mut report);
            safe.insert(key.clone(), bounded);
        }

        debug!(
            kept = safe.len(),
            hashed = report.hashed_keys.len(),
            dropped = report.dropped_keys.len(),
            truncated = report.truncated_keys.len(),
            clipped = report.clipped_keys.len(),
            "payload redacted"
        );

        RedactionOutcome {
            payload: RedactedPayload::from_entries(safe),
            applicant_ref,
            report,
        }
    }

    /// Validate a JSON object and redact it.
    ///
    /// # Errors
    ///
    /// [`RedactionError::PayloadShape`] if any value is a nested object or a
    /// sequence containing non-scalars.
    pub fn redact_json(
        &self,
        raw: &Map<String, Value>,
        applicant_id: Option<&str>,
    ) -> Result<RedactionOutcome> {
        let payload = Payload::from_json_map(raw)?;
        Ok(self.redact(&payload, applicant_id))
    }

    /// The applicant reference the policy produces for `applicant_id`.
    pub fn applicant_ref(&self, applicant_id: Option<&str>) -> Option<String> {
        let id = applicant_id?;
        match self.policy.applicant_id_handling() {
            ApplicantIdHandling::Remove => None,
            ApplicantIdHandling::Hash => Some(self.policy.hasher().hash(id)),
            ApplicantIdHandling::Clear => Some(id.to_string()),
        }
    }

    /// Keyed hash of an applicant id, for filtering stored events by applicant.
    ///
    /// # Errors
    ///
    /// [`RedactionError::Configuration`] if the policy has no salt.
    pub fn hash_applicant_id(&self, applicant_id: &str) -> Result<String> {
        if !self.policy.hasher().has_salt() {
            return Err(RedactionError::Configuration(
                "cannot hash applicant ids without a hash_salt".to_string(),
            ));
        }
        Ok(self.policy.hasher().hash(applicant_id))
    }

    fn bound(&self, key: &str, value: PayloadValue, report: &mut RedactionReport) -> PayloadValue {
        let max_len = self.policy.max_string_length();
        match value {
            PayloadValue::Scalar(Scalar::String(s)) => {
                let (s, cut) = truncate_chars(s, max_len);
                if cut {
                    report.truncated_keys.push(key.to_string());
                }
                PayloadValue::Scalar(Scalar::String(s))
            }
            PayloadValue::Scalar(other) => PayloadValue::Scalar(other),
            PayloadValue::List(items) => {
                let max_items = self.policy.max_list_items();
                let total = items.len();
                let mut any_cut = false;

                let mut kept: Vec<Scalar> = items
                    .into_iter()
                    .take(max_items)
                    .map(|item| match item {
                        Scalar::String(s) => {
                            let (s, cut) = truncate_chars(s, max_len);
                            any_cut |= cut;
                            Scalar::String(s)
                        }
                        other => other,
                    })
                    .collect();

                if any_cut {
                    report.truncated_keys.push(key.to_string());
                }
                if total > max_items {
                    kept.push(Scalar::String(clip_marker(total - max_items)));
                    report.clipped_keys.push(key.to_string());
                }
                PayloadValue::List(kept)
            }
        }
    }
}

/// Marker element for a clipped sequence.
pub fn clip_marker(omitted: usize) -> String {
    format!("{}{}]", CLIP_MARKER_PREFIX, omitted)
}

/// Cut `s` to `max_chars` characters, appending [`TRUNCATION_MARKER`] if cut.
fn truncate_chars(s: String, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        None => (s, false),
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&s[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        }
    }
}
