//! Indexed backend: the same durable log plus in-memory indexes.
//!
//! Indexes are rebuilt from the log on open, so the log stays the only
//! durable state. Reads take the index read lock just long enough to collect
//! record locations, then read records by offset without holding any lock.

use crate::entry::{AuditEvent, EventType, NewAuditEvent};
use crate::error::{AuditError, Result};
use crate::journal::{Journal, Slot, SlotReader};
use crate::store::{AuditStore, EventIter, ExportFilter};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    event_id: u64,
    created_at: DateTime<Utc>,
    slot: Slot,
}

/// Positions into `entries`, which is in append order (and therefore sorted
/// by both event id and `created_at`).
#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    by_request: HashMap<String, Vec<usize>>,
    by_type: HashMap<EventType, Vec<usize>>,
    by_applicant: HashMap<String, Vec<usize>>,
}

impl IndexState {
    fn insert(&mut self, event: &AuditEvent, slot: Slot) {
        let pos = self.entries.len();
        self.entries.push(IndexEntry {
            event_id: event.event_id,
            created_at: event.created_at,
            slot,
        });
        self.by_request
            .entry(event.request_id.clone())
            .or_default()
            .push(pos);
        self.by_type
            .entry(event.event_type.clone())
            .or_default()
            .push(pos);
        if let Some(applicant_ref) = &event.applicant_ref {
            self.by_applicant
                .entry(applicant_ref.clone())
                .or_default()
                .push(pos);
        }
    }

    fn find(&self, event_id: u64) -> Option<Slot> {
        self.entries
            .binary_search_by_key(&event_id, |e| e.event_id)
            .ok()
            .map(|pos| self.entries[pos].slot)
    }

    /// Locations of records that may match `filter`, in append order.
    ///
    /// Exact for every field except `model_version`, which is not indexed.
    fn candidates(&self, filter: &ExportFilter) -> Vec<Slot> {
        let (lo, hi) = self.time_bounds(filter);
        if lo >= hi {
            return Vec::new();
        }

        let mut lists = Vec::new();
        if let Some(request_id) = &filter.request_id {
            lists.push(self.by_request.get(request_id));
        }
        if let Some(event_type) = &filter.event_type {
            lists.push(self.by_type.get(event_type));
        }
        if let Some(applicant_ref) = &filter.applicant_ref {
            lists.push(self.by_applicant.get(applicant_ref));
        }
        if lists.iter().any(Option::is_none) {
            return Vec::new();
        }
        let mut lists: Vec<&Vec<usize>> = lists.into_iter().flatten().collect();
        lists.sort_by_key(|list| list.len());

        match lists.split_first() {
            None => self.entries[lo..hi].iter().map(|e| e.slot).collect(),
            Some((narrowest, rest)) => {
                let start = narrowest.partition_point(|&p| p < lo);
                let end = narrowest.partition_point(|&p| p < hi);
                narrowest[start..end]
                    .iter()
                    .filter(|&&pos| rest.iter().all(|list| list.binary_search(&pos).is_ok()))
                    .map(|&pos| self.entries[pos].slot)
                    .collect()
            }
        }
    }

    fn time_bounds(&self, filter: &ExportFilter) -> (usize, usize) {
        let range = filter.time_range.unwrap_or_default();
        let lo = range.since.map_or(0, |since| {
            self.entries.partition_point(|e| e.created_at < since)
        });
        let hi = range.until.map_or(self.entries.len(), |until| {
            self.entries.partition_point(|e| e.created_at <= until)
        });
        (lo, hi)
    }
}

/// JSON Lines file with request, type, applicant and time indexes.
pub struct IndexedAuditStore {
    journal: Journal,
    index: RwLock<IndexState>,
}

impl IndexedAuditStore {
    /// Open or create the store at `path` and rebuild its indexes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut state = IndexState::default();
        let journal = Journal::open(path.as_ref(), |event, slot| state.insert(event, slot))?;
        debug!(
            events = state.entries.len(),
            requests = state.by_request.len(),
            "audit indexes rebuilt"
        );
        Ok(IndexedAuditStore {
            journal,
            index: RwLock::new(state),
        })
    }

    /// Index records appended through other handles since the last read.
    fn catch_up(&self) -> Result<()> {
        self.journal.refresh(|event, slot| self.insert(event, slot))
    }

    fn insert(&self, event: &AuditEvent, slot: Slot) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event, slot);
    }

    fn snapshot(&self, filter: &ExportFilter) -> Result<Vec<Slot>> {
        self.catch_up()?;
        let index = self.index.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(index.candidates(filter))
    }
}

impl AuditStore for IndexedAuditStore {
    fn backend_name(&self) -> &'static str {
        "indexed"
    }

    fn path(&self) -> &Path {
        self.journal.path()
    }

    fn append(&self, event: NewAuditEvent) -> Result<u64> {
        let stored = self
            .journal
            .append(event, |event, slot| self.insert(event, slot))?;
        Ok(stored.event_id)
    }

    fn get_by_request_id(&self, request_id: &str) -> Result<Vec<AuditEvent>> {
        self.export(ExportFilter::all().request_id(request_id))?
            .collect()
    }

    fn export(&self, filter: ExportFilter) -> Result<EventIter<'_>> {
        let slots = self.snapshot(&filter)?;
        let reader = self.journal.slot_reader()?;
        Ok(Box::new(IndexedEvents {
            reader,
            slots: slots.into_iter(),
            filter,
        }))
    }

    fn get(&self, event_id: u64) -> Result<Option<AuditEvent>> {
        self.catch_up()?;
        let slot = self
            .index
            .read()
            .map_err(|_| AuditError::LockPoisoned)?
            .find(event_id);
        match slot {
            Some(slot) => Ok(Some(self.journal.slot_reader()?.read(slot)?)),
            None => Ok(None),
        }
    }

    fn count(&self, filter: ExportFilter) -> Result<usize> {
        if filter.model_version.is_some() {
            let mut total = 0;
            for event in self.export(filter)? {
                event?;
                total += 1;
            }
            return Ok(total);
        }
        Ok(self.snapshot(&filter)?.len())
    }
}

struct IndexedEvents {
    reader: SlotReader,
    slots: std::vec::IntoIter<Slot>,
    filter: ExportFilter,
}

impl Iterator for IndexedEvents {
    type Item = Result<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            match self.reader.read(slot) {
                Ok(event) if !self.filter.matches(&event) => continue,
                result => return Some(result),
            }
        }
        None
    }
}
