//! Append-only, tamper-evident audit event store.
//!
//! Every scoring decision and outcome event is recorded as one redacted
//! [`AuditEvent`]. Payloads reach a store only through a
//! [`mie_redact::Redactor`], so raw identifiers are never persisted.
//!
//! # Design
//!
//! - **Format**: JSON Lines, one event per line, never rewritten in place
//! - **Hash chain**: each event carries `prev_hash` and its own `entry_hash`
//! - **Durability**: `append` returns only after the record is `fsync`ed
//! - **Backends**: a sequential log and an indexed store behind [`AuditStore`],
//!   selected by [`StoreBackend`]
//! - **Verification**: [`verify_log`] re-checks the whole chain
//!
//! # Usage
//!
//! ```no_run
//! use mie_audit::{open_store, AuditRecorder, EventType, RecordRequest, StoreBackend, StoreConfig};
//! use mie_redact::{HashSalt, RedactionPolicy, Redactor};
//! use std::sync::Arc;
//!
//! let policy = RedactionPolicy::builder()
//!     .allowed_payload_keys(["score", "decision"])
//!     .hash_salt(HashSalt::new("from-secret-store"))
//!     .build()?;
//! let store = open_store(&StoreConfig::new(StoreBackend::Indexed, "/var/lib/mie/audit.jsonl"))?;
//! let recorder = AuditRecorder::new(Arc::new(Redactor::new(policy)), store);
//!
//! let raw = serde_json::json!({"score": 0.82, "decision": "approve", "ssn": "123-45-6789"});
//! let receipt = recorder.record_json(
//!     RecordRequest {
//!         request_id: "req-1",
//!         event_type: EventType::score_decision(),
//!         model_version: None,
//!         applicant_id: Some("app_123"),
//!     },
//!     raw.as_object().unwrap(),
//! )?;
//! println!("stored event {}", receipt.event_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # File Location
//!
//! Unless configured otherwise the store lives at:
//! - `$MIE_DATA/audit/audit.jsonl` (if MIE_DATA is set)
//! - `$XDG_DATA_HOME/mie_credit_platform/audit/audit.jsonl` (otherwise)

mod entry;
mod error;
mod indexed;
mod journal;
mod log_store;
mod recorder;
mod store;
mod verify;

pub use entry::{
    AuditEvent, EventType, NewAuditEvent, AUDIT_SCHEMA_VERSION, GENESIS_HASH, MAX_EVENT_TYPE_LEN,
};
pub use error::{AuditError, Result};
pub use indexed::IndexedAuditStore;
pub use log_store::JsonlAuditStore;
pub use recorder::{AuditRecorder, RecordError, RecordReceipt, RecordRequest};
pub use store::{
    open_store, resolve_audit_dir, resolve_default_path, AuditStore, EventIter, ExportFilter,
    StoreBackend, StoreConfig, TimeRange, MAX_QUERY_LIMIT,
};
pub use verify::{verify_log, BreakType, BrokenLink, SchemaWarning, TamperedEntry, VerificationResult};
