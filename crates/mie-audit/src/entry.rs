//! Audit event types and schema.
//!
//! Each persisted event carries:
//! - Store-assigned id and timestamp (callers cannot backdate)
//! - Request correlation, event type and model provenance
//! - The redacted payload and applicant reference
//! - Hash chain fields for integrity

use crate::error::{AuditError, Result};
use chrono::{DateTime, Utc};
use mie_redact::{RedactedPayload, RedactionOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Schema version for persisted audit events.
pub const AUDIT_SCHEMA_VERSION: &str = "1.0.0";

/// `prev_hash` of the first event in a store.
pub const GENESIS_HASH: &str = "genesis";

/// Longest accepted event type tag.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

static EVENT_TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_.-]*$").expect("event type pattern is valid")
});

/// Open event type tag.
///
/// Any tag matching `^[a-z][a-z0-9_.-]*$` is accepted, so new kinds of
/// events never need a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    pub const SCORE_DECISION: &'static str = "score_decision";
    pub const OUTCOME_EVENT: &'static str = "outcome_event";

    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.len() > MAX_EVENT_TYPE_LEN {
            return Err(AuditError::InvalidEventType {
                reason: format!("longer than {} characters", MAX_EVENT_TYPE_LEN),
                tag,
            });
        }
        if !EVENT_TYPE_PATTERN.is_match(&tag) {
            return Err(AuditError::InvalidEventType {
                reason: "must match ^[a-z][a-z0-9_.-]*$".to_string(),
                tag,
            });
        }
        Ok(EventType(tag))
    }

    pub fn score_decision() -> Self {
        EventType(Self::SCORE_DECISION.to_string())
    }

    pub fn outcome_event() -> Self {
        EventType(Self::OUTCOME_EVENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventType {
    type Error = AuditError;

    fn try_from(tag: String) -> Result<Self> {
        EventType::new(tag)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.0
    }
}

impl std::str::FromStr for EventType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::new(s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event ready to append: everything except the store-assigned fields.
///
/// The payload can only come from a redaction, so raw payloads never reach
/// a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub request_id: String,
    pub event_type: EventType,
    pub model_version: Option<String>,
    pub applicant_ref: Option<String>,
    pub payload: RedactedPayload,
}

impl NewAuditEvent {
    pub fn from_outcome(
        request_id: impl Into<String>,
        event_type: EventType,
        outcome: RedactionOutcome,
    ) -> Self {
        NewAuditEvent {
            request_id: request_id.into(),
            event_type,
            model_version: None,
            applicant_ref: outcome.applicant_ref,
            payload: outcome.payload,
        }
    }

    pub fn with_model_version(mut self, model_version: impl Into<String>) -> Self {
        self.model_version = Some(model_version.into());
        self
    }
}

/// A persisted audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Schema version for forward compatibility.
    pub schema_version: String,

    /// Store-assigned id, strictly increasing from 1.
    pub event_id: u64,

    /// Store-assigned append time; non-decreasing in append order.
    pub created_at: DateTime<Utc>,

    pub request_id: String,

    pub event_type: EventType,

    /// Opaque model provenance string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,

    /// Hashed applicant id, or absent when the policy removes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_ref: Option<String>,

    pub payload: RedactedPayload,

    /// Entry hash of the previous event, or "genesis" for the first.
    pub prev_hash: String,

    /// SHA-256 of this event serialized without `entry_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

impl AuditEvent {
    pub(crate) fn assign(
        new: NewAuditEvent,
        event_id: u64,
        created_at: DateTime<Utc>,
        prev_hash: impl Into<String>,
    ) -> Self {
        AuditEvent {
            schema_version: AUDIT_SCHEMA_VERSION.to_string(),
            event_id,
            created_at,
            request_id: new.request_id,
            event_type: new.event_type,
            model_version: new.model_version,
            applicant_ref: new.applicant_ref,
            payload: new.payload,
            prev_hash: prev_hash.into(),
            entry_hash: None,
        }
    }

    /// Compute and set the entry hash.
    pub fn compute_hash(&mut self) -> Result<()> {
        self.entry_hash = None;
        let digest = self.digest()?;
        self.entry_hash = Some(digest);
        Ok(())
    }

    /// SHA-256 over the event as serialized without `entry_hash`.
    pub fn digest(&self) -> Result<String> {
        let serialized = if self.entry_hash.is_some() {
            let mut unhashed = self.clone();
            unhashed.entry_hash = None;
            serde_json::to_string(&unhashed)
        } else {
            serde_json::to_string(self)
        };
        let json = serialized.map_err(|source| AuditError::Serialization { source })?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Whether the stored entry hash matches the event contents.
    pub fn verify_hash(&self) -> bool {
        match (&self.entry_hash, self.digest()) {
            (Some(stored), Ok(computed)) => *stored == computed,
            _ => false,
        }
    }

    /// Entry hash for chaining.
    pub fn hash(&self) -> &str {
        self.entry_hash.as_deref().unwrap_or("invalid")
    }

    /// Serialize to a newline-terminated JSON line.
    pub(crate) fn to_jsonl(&self) -> Result<Vec<u8>> {
        let mut line =
            serde_json::to_vec(self).map_err(|source| AuditError::Serialization { source })?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mie_redact::{HashSalt, Payload, RedactionPolicy, Redactor};

    fn outcome() -> RedactionOutcome {
        let redactor = Redactor::new(
            RedactionPolicy::builder()
                .allowed_payload_keys(["score"])
                .hash_salt(HashSalt::new("entry-test"))
                .build()
                .unwrap(),
        );
        redactor.redact(&Payload::new().with("score", 0.7).with("ssn", "x"), Some("app_1"))
    }

    fn event() -> AuditEvent {
        let new = NewAuditEvent::from_outcome("req-1", EventType::score_decision(), outcome())
            .with_model_version("credit-lr@3");
        AuditEvent::assign(new, 1, Utc::now(), GENESIS_HASH)
    }

    #[test]
    fn test_event_type_accepts_open_tags() {
        for tag in ["score_decision", "outcome_event", "fairness_report", "explain.v2", "a-b"] {
            assert!(EventType::new(tag).is_ok(), "{tag} should be accepted");
        }
    }

    #[test]
    fn test_event_type_rejects_bad_tags() {
        for tag in ["", "Score", "1score", "score decision", "score/x"] {
            assert!(EventType::new(tag).is_err(), "{tag:?} should be rejected");
        }
        assert!(EventType::new("a".repeat(MAX_EVENT_TYPE_LEN + 1)).is_err());
        assert!(EventType::new("a".repeat(MAX_EVENT_TYPE_LEN)).is_ok());
    }

    #[test]
    fn test_event_type_deserialize_validates() {
        let ok: EventType = serde_json::from_str(r#""outcome_event""#).unwrap();
        assert_eq!(ok.as_str(), "outcome_event");
        assert!(serde_json::from_str::<EventType>(r#""NOPE""#).is_err());
    }

    #[test]
    fn test_from_outcome_carries_redacted_fields() {
        let new = NewAuditEvent::from_outcome("req-1", EventType::score_decision(), outcome());
        assert!(new.payload.contains_key("score"));
        assert!(!new.payload.contains_key("ssn"));
        assert!(new.applicant_ref.as_deref().is_some_and(mie_redact::is_hashed));
        assert_eq!(new.model_version, None);
    }

    #[test]
    fn test_hash_computation() {
        let mut e = event();
        assert!(e.entry_hash.is_none());
        e.compute_hash().unwrap();
        assert_eq!(e.hash().len(), 64);
        assert!(e.verify_hash());
    }

    #[test]
    fn test_hash_detects_tampering() {
        let mut e = event();
        e.compute_hash().unwrap();
        e.request_id = "req-2".to_string();
        assert!(!e.verify_hash());
    }

    #[test]
    fn test_hash_survives_round_trip() {
        let mut e = event();
        e.compute_hash().unwrap();
        let line = e.to_jsonl().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let back: AuditEvent = serde_json::from_slice(&line).unwrap();
        assert_eq!(back, e);
        assert!(back.verify_hash());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let mut e = event();
        e.applicant_ref = None;
        e.model_version = None;
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("applicant_ref"));
        assert!(!json.contains("model_version"));
        assert!(!json.contains("entry_hash"));
    }
}
