//! Hash chain verification for audit store files.
//!
//! Works on the data file of either backend: both write the same records.

use crate::entry::{AuditEvent, AUDIT_SCHEMA_VERSION, GENESIS_HASH};
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Result of hash chain verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether the store passed integrity verification.
    pub is_valid: bool,

    /// Total number of events verified.
    pub entries_verified: u64,

    /// Hash of all entry hashes, in order.
    pub state_hash: String,

    /// Trailing bytes without a newline (an unacknowledged write).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub torn_tail: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_link: Option<BrokenLink>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tampered_entries: Vec<TamperedEntry>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_warnings: Vec<SchemaWarning>,
}

impl VerificationResult {
    fn empty() -> Self {
        VerificationResult {
            is_valid: true,
            entries_verified: 0,
            state_hash: "empty".to_string(),
            torn_tail: false,
            broken_link: None,
            tampered_entries: Vec::new(),
            schema_warnings: Vec::new(),
        }
    }
}

/// First broken link in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenLink {
    /// Line number where the break was detected (1-indexed).
    pub line: usize,
    pub expected: String,
    pub actual: String,
    pub break_type: BreakType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakType {
    /// The prev_hash doesn't match the previous event's hash.
    ChainMismatch,
    /// Event ids skip or repeat.
    IdSequence,
    /// The first event doesn't have the genesis hash.
    InvalidGenesis,
}

/// An event whose contents no longer match its own hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TamperedEntry {
    pub line: usize,
    pub event_id: u64,
    pub stored_hash: String,
    pub computed_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaWarning {
    pub line: usize,
    pub version: String,
    pub expected: String,
}

/// Verify the integrity of a store file.
///
/// Checks every event's self-hash, the `prev_hash` chain and the id
/// sequence, reporting the first broken link and all tampered events. A
/// missing file verifies as empty.
pub fn verify_log(path: &Path) -> Result<VerificationResult> {
    if !path.exists() {
        return Ok(VerificationResult::empty());
    }

    let file = File::open(path).map_err(|e| AuditError::read(path, e))?;
    let mut reader = BufReader::new(file);
    let mut result = VerificationResult::empty();
    let mut prev_hash = GENESIS_HASH.to_string();
    let mut prev_id = 0u64;
    let mut state = Sha256::new();
    let mut buf = Vec::new();
    let mut line_num = 0usize;

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| AuditError::read(path, e))?;
        if n == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            result.torn_tail = true;
            break;
        }
        line_num += 1;
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let event: AuditEvent =
            serde_json::from_slice(&buf).map_err(|source| AuditError::Parse {
                path: path.to_path_buf(),
                line: line_num,
                source,
            })?;

        if event.schema_version != AUDIT_SCHEMA_VERSION {
            result.schema_warnings.push(SchemaWarning {
                line: line_num,
                version: event.schema_version.clone(),
                expected: AUDIT_SCHEMA_VERSION.to_string(),
            });
        }

        if !event.verify_hash() {
            result.tampered_entries.push(TamperedEntry {
                line: line_num,
                event_id: event.event_id,
                stored_hash: event.entry_hash.clone().unwrap_or_default(),
                computed_hash: event.digest().unwrap_or_default(),
            });
        }

        let expected_id = prev_id.checked_add(1).ok_or_else(|| AuditError::Integrity {
            message: format!("event at line {line_num} follows id {prev_id}, which exhausts the id space"),
        })?;
        if result.broken_link.is_none() {
            result.broken_link = check_link(line_num, &prev_hash, expected_id, &event);
        }

        prev_hash = event.hash().to_string();
        prev_id = event.event_id;
        state.update(prev_hash.as_bytes());
        result.entries_verified += 1;
    }

    if result.entries_verified > 0 {
        result.state_hash = hex::encode(state.finalize());
    }
    result.is_valid = result.broken_link.is_none() && result.tampered_entries.is_empty();
    Ok(result)
}

fn check_link(
    line: usize,
    prev_hash: &str,
    expected_id: u64,
    event: &AuditEvent,
) -> Option<BrokenLink> {
    if event.prev_hash != prev_hash {
        let break_type = if expected_id == 1 {
            BreakType::InvalidGenesis
        } else {
            BreakType::ChainMismatch
        };
        return Some(BrokenLink {
            line,
            expected: prev_hash.to_string(),
            actual: event.prev_hash.clone(),
            break_type,
        });
    }
    if event.event_id != expected_id {
        return Some(BrokenLink {
            line,
            expected: expected_id.to_string(),
            actual: event.event_id.to_string(),
            break_type: BreakType::IdSequence,
        });
    }
    None
}
