//! Redact-then-append: the only path from a raw payload to the store.

use crate::entry::{EventType, NewAuditEvent};
use crate::error::AuditError;
use crate::store::AuditStore;
use mie_redact::{Payload, RedactionError, RedactionReport, Redactor};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Failure of either stage. Never downgraded or swallowed.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Redaction(#[from] RedactionError),

    #[error(transparent)]
    Store(#[from] AuditError),
}

/// What a successful record produced. Carries key names only.
#[derive(Debug, Clone, Serialize)]
pub struct RecordReceipt {
    pub event_id: u64,
    pub request_id: String,
    pub event_type: EventType,
    pub report: RedactionReport,
}

/// One event to record, before redaction.
#[derive(Debug, Clone)]
pub struct RecordRequest<'a> {
    pub request_id: &'a str,
    pub event_type: EventType,
    pub model_version: Option<&'a str>,
    pub applicant_id: Option<&'a str>,
}

/// Composes a [`Redactor`] with a shared store.
#[derive(Clone)]
pub struct AuditRecorder {
    redactor: Arc<Redactor>,
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(redactor: Arc<Redactor>, store: Arc<dyn AuditStore>) -> Self {
        AuditRecorder { redactor, store }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Validate, redact and append a raw JSON payload.
    ///
    /// A payload shape error returns before the store is touched.
    pub fn record_json(
        &self,
        request: RecordRequest<'_>,
        raw: &Map<String, Value>,
    ) -> Result<RecordReceipt, RecordError> {
        let payload = Payload::from_json_map(raw).inspect_err(|e| {
            debug!(request_id = request.request_id, error = %e, "payload rejected before append");
        })?;
        self.record(request, &payload)
    }

    /// Redact and append an already validated payload.
    pub fn record(
        &self,
        request: RecordRequest<'_>,
        payload: &Payload,
    ) -> Result<RecordReceipt, RecordError> {
        let outcome = self.redactor.redact(payload, request.applicant_id);
        let report = outcome.report.clone();

        let mut event =
            NewAuditEvent::from_outcome(request.request_id, request.event_type.clone(), outcome);
        if let Some(model_version) = request.model_version {
            event = event.with_model_version(model_version);
        }

        let event_id = self.store.append(event).inspect_err(|e| {
            error!(
                request_id = request.request_id,
                event_type = %request.event_type,
                error = %e,
                "audit record failed"
            );
        })?;

        Ok(RecordReceipt {
            event_id,
            request_id: request.request_id.to_string(),
            event_type: request.event_type,
            report,
        })
    }
}
