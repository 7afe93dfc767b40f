//! The audit store contract, read filters and backend selection.

use crate::entry::{AuditEvent, EventType, NewAuditEvent};
use crate::error::{AuditError, Result};
use crate::indexed::IndexedAuditStore;
use crate::log_store::JsonlAuditStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Largest page `query` returns.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default directory name for the store within the data directory.
pub(crate) const AUDIT_DIR_NAME: &str = "audit";

/// Default store filename.
pub(crate) const AUDIT_LOG_FILENAME: &str = "audit.jsonl";

/// Lazy, finite sequence of stored events.
pub type EventIter<'a> = Box<dyn Iterator<Item = Result<AuditEvent>> + Send + 'a>;

/// Inclusive time bounds. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| ts >= since) && self.until.map_or(true, |until| ts <= until)
    }
}

/// Conjunctive filter over stored events. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl ExportFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.time_range.get_or_insert_with(TimeRange::default).since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.time_range.get_or_insert_with(TimeRange::default).until = Some(until);
        self
    }

    pub fn applicant_ref(mut self, applicant_ref: impl Into<String>) -> Self {
        self.applicant_ref = Some(applicant_ref.into());
        self
    }

    pub fn model_version(mut self, model_version: impl Into<String>) -> Self {
        self.model_version = Some(model_version.into());
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.request_id
            .as_ref()
            .map_or(true, |id| event.request_id == *id)
            && self
                .event_type
                .as_ref()
                .map_or(true, |t| event.event_type == *t)
            && self
                .time_range
                .map_or(true, |range| range.contains(event.created_at))
            && self
                .applicant_ref
                .as_ref()
                .map_or(true, |r| event.applicant_ref.as_ref() == Some(r))
            && self
                .model_version
                .as_ref()
                .map_or(true, |v| event.model_version.as_ref() == Some(v))
    }
}

/// Append-only audit event store.
///
/// There is no update or delete. Implementations serialize appends on one
/// writer lock and never expose a partially written event to readers.
pub trait AuditStore: Send + Sync {
    /// Short backend label for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// File holding the durable records.
    fn path(&self) -> &Path;

    /// Assign id, timestamp and chain hash, persist durably, then return the
    /// assigned event id.
    fn append(&self, event: NewAuditEvent) -> Result<u64>;

    /// Events for a request in append order. Empty if there are none.
    fn get_by_request_id(&self, request_id: &str) -> Result<Vec<AuditEvent>>;

    /// Events matching `filter` in append order.
    ///
    /// Each call reads from the beginning of the store; the iterator sees the
    /// events committed when it was created.
    fn export(&self, filter: ExportFilter) -> Result<EventIter<'_>>;

    fn get(&self, event_id: u64) -> Result<Option<AuditEvent>> {
        for event in self.export(ExportFilter::all())? {
            let event = event?;
            if event.event_id == event_id {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// A page of matching events, newest first. `limit` is clamped to
    /// `1..=MAX_QUERY_LIMIT`.
    fn query(&self, filter: ExportFilter, limit: usize, offset: usize) -> Result<Vec<AuditEvent>> {
        let limit = limit.clamp(1, MAX_QUERY_LIMIT);
        let window = limit.saturating_add(offset);
        let mut newest = VecDeque::with_capacity(window.min(MAX_QUERY_LIMIT * 2));
        for event in self.export(filter)? {
            newest.push_back(event?);
            if newest.len() > window {
                newest.pop_front();
            }
        }
        Ok(newest.into_iter().rev().skip(offset).take(limit).collect())
    }

    fn count(&self, filter: ExportFilter) -> Result<usize> {
        let mut total = 0;
        for event in self.export(filter)? {
            event?;
            total += 1;
        }
        Ok(total)
    }

    /// Write matching events to `out` as JSON Lines. Returns rows written.
    fn export_jsonl(&self, filter: ExportFilter, out: &Path) -> Result<usize> {
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::write(parent, e))?;
        }
        let file = File::create(out).map_err(|e| AuditError::write(out, e))?;
        let mut writer = BufWriter::new(file);
        let mut rows = 0;
        for event in self.export(filter)? {
            let line = event?.to_jsonl()?;
            writer
                .write_all(&line)
                .map_err(|e| AuditError::write(out, e))?;
            rows += 1;
        }
        writer
            .into_inner()
            .map_err(|e| AuditError::write(out, e.into_error()))?
            .sync_all()
            .map_err(|e| AuditError::write(out, e))?;
        Ok(rows)
    }
}

/// Storage strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Sequential append-only log, scanned on read.
    #[default]
    Log,
    /// Same log plus in-memory indexes by request, type and time.
    Indexed,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Log => f.write_str("log"),
            StoreBackend::Indexed => f.write_str("indexed"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "jsonl" => Ok(StoreBackend::Log),
            "indexed" | "index" => Ok(StoreBackend::Indexed),
            other => Err(format!("unknown audit backend {other:?} (expected log or indexed)")),
        }
    }
}

/// Where and how to store audit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl StoreConfig {
    pub fn new(backend: StoreBackend, path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            backend,
            path: path.into(),
        }
    }
}

/// Open the configured backend.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn AuditStore>> {
    Ok(match config.backend {
        StoreBackend::Log => Arc::new(JsonlAuditStore::open(&config.path)?),
        StoreBackend::Indexed => Arc::new(IndexedAuditStore::open(&config.path)?),
    })
}

/// Default store file using standard XDG paths.
pub fn resolve_default_path() -> Result<PathBuf> {
    Ok(resolve_audit_dir()?.join(AUDIT_LOG_FILENAME))
}

/// Resolve the audit data directory.
pub fn resolve_audit_dir() -> Result<PathBuf> {
    // 1. Explicit override: MIE_DATA
    if let Ok(dir) = std::env::var("MIE_DATA") {
        return Ok(PathBuf::from(dir).join(AUDIT_DIR_NAME));
    }

    // 2. XDG_DATA_HOME
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg)
            .join("mie_credit_platform")
            .join(AUDIT_DIR_NAME));
    }

    // 3. Platform default (dirs crate)
    if let Some(base) = dirs::data_dir() {
        return Ok(base.join("mie_credit_platform").join(AUDIT_DIR_NAME));
    }

    Err(AuditError::DataDirUnavailable)
}
