//! Redaction engine for the MIE credit platform audit trail.
//!
//! Every scoring decision and outcome event passes through this crate before
//! it reaches durable storage. The engine guarantees that applicant
//! identifiers and other sensitive payload fields are hashed, dropped or
//! bounded according to a [`RedactionPolicy`].
//!
//! # Key Features
//!
//! - **Closed payload model**: payloads are one level of scalars or flat
//!   sequences; nested objects are rejected, never flattened.
//! - **Keyed hashing**: HMAC-SHA256 with a per-deployment salt, so hashed
//!   identifiers cannot be recovered by dictionary attack without the salt.
//! - **Deterministic**: the same policy and input always yield byte-identical
//!   output, independent of the caller's key order.
//! - **Bounded**: long strings are truncated and long sequences clipped, with
//!   explicit markers.
//!
//! # Example
//!
//! ```
//! use mie_redact::{HashSalt, RedactionPolicy, Redactor};
//! use serde_json::json;
//!
//! let policy = RedactionPolicy::builder()
//!     .allowed_payload_keys(["score", "decision"])
//!     .hash_salt(HashSalt::new("deployment-salt"))
//!     .build()
//!     .unwrap();
//! let redactor = Redactor::new(policy);
//!
//! let raw = json!({"score": 0.82, "decision": "approve", "ssn": "123-45-6789"});
//! let out = redactor
//!     .redact_json(raw.as_object().unwrap(), Some("app_123"))
//!     .unwrap();
//!
//! assert!(!out.payload.contains_key("ssn"));
//! assert_ne!(out.applicant_ref.as_deref(), Some("app_123"));
//! ```

pub mod canonicalize;
pub mod engine;
pub mod error;
pub mod hash;
pub mod policy;
pub mod value;

pub use canonicalize::{canonical_string, CANONICALIZATION_VERSION};
pub use engine::{
    clip_marker, RedactionOutcome, RedactionReport, Redactor, CLIP_MARKER_PREFIX,
    TRUNCATION_MARKER,
};
pub use error::{RedactionError, Result};
pub use hash::{is_hashed, HashSalt, KeyedHasher, HASH_ALGORITHM, SALT_BYTES};
pub use policy::{
    default_allowed_payload_keys, ApplicantIdHandling, KeyDisposition, PolicySummary,
    RedactionPolicy, RedactionPolicyBuilder, DEFAULT_ALLOWED_PAYLOAD_KEYS,
    DEFAULT_HASH_KEY_ID, DEFAULT_MAX_LIST_ITEMS, DEFAULT_MAX_STRING_LENGTH,
};
pub use value::{Payload, PayloadValue, RedactedPayload, Scalar};
