//! Sequential log backend: every read is a scan of the committed log.

use crate::entry::{AuditEvent, NewAuditEvent};
use crate::error::Result;
use crate::journal::Journal;
use crate::store::{AuditStore, EventIter, ExportFilter};
use std::path::Path;

/// Append-only JSON Lines file.
pub struct JsonlAuditStore {
    journal: Journal,
}

impl JsonlAuditStore {
    /// Open or create the log at `path`, repairing a torn trailing record.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let journal = Journal::open(path.as_ref(), |_, _| {})?;
        Ok(JsonlAuditStore { journal })
    }
}

impl AuditStore for JsonlAuditStore {
    fn backend_name(&self) -> &'static str {
        "log"
    }

    fn path(&self) -> &Path {
        self.journal.path()
    }

    fn append(&self, event: NewAuditEvent) -> Result<u64> {
        Ok(self.journal.append(event, |_, _| {})?.event_id)
    }

    fn get_by_request_id(&self, request_id: &str) -> Result<Vec<AuditEvent>> {
        self.export(ExportFilter::all().request_id(request_id))?
            .collect()
    }

    fn export(&self, filter: ExportFilter) -> Result<EventIter<'_>> {
        self.journal.refresh(|_, _| {})?;
        let lines = self.journal.lines()?;
        Ok(Box::new(lines.filter(move |event| match event {
            Ok(event) => filter.matches(event),
            Err(_) => true,
        })))
    }
}
