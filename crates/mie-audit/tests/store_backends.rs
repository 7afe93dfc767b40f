//! Behavioural tests shared by both store backends.
//!
//! These tests verify:
//! - Both backends answer every read identically
//! - Stores survive reopen with ids, chain and indexes intact
//! - Query paging, counting and JSONL export
//! - Redaction happens before anything reaches the file

use chrono::Utc;
use mie_audit::{
    open_store, verify_log, AuditEvent, AuditRecorder, AuditStore, EventType, ExportFilter,
    NewAuditEvent, RecordError, RecordRequest, StoreBackend, StoreConfig, MAX_QUERY_LIMIT,
};
use mie_redact::{HashSalt, Payload, RedactionError, RedactionPolicy, Redactor};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const BACKENDS: [StoreBackend; 2] = [StoreBackend::Log, StoreBackend::Indexed];

fn redactor() -> Redactor {
    Redactor::new(
        RedactionPolicy::builder()
            .allowed_payload_keys(["score", "decision", "outcome"])
            .hash_salt(HashSalt::new("backend-test"))
            .build()
            .unwrap(),
    )
}

fn config(tmp: &TempDir, backend: StoreBackend) -> StoreConfig {
    StoreConfig::new(backend, tmp.path().join(format!("{backend}.jsonl")))
}

/// Seven events across three requests, two event types, two models.
fn populate(store: &dyn AuditStore, redactor: &Redactor) {
    let rows = [
        ("req-a", EventType::SCORE_DECISION, "m1", "app_1"),
        ("req-b", EventType::SCORE_DECISION, "m1", "app_2"),
        ("req-a", EventType::OUTCOME_EVENT, "m1", "app_1"),
        ("req-c", EventType::SCORE_DECISION, "m2", "app_3"),
        ("req-b", EventType::OUTCOME_EVENT, "m1", "app_2"),
        ("req-c", "fairness_report", "m2", "app_3"),
        ("req-a", EventType::OUTCOME_EVENT, "m2", "app_1"),
    ];
    for (i, (request_id, event_type, model, applicant)) in rows.into_iter().enumerate() {
        let payload = Payload::new()
            .with("score", i as i64)
            .with("ssn", "123-45-6789");
        let outcome = redactor.redact(&payload, Some(applicant));
        store
            .append(
                NewAuditEvent::from_outcome(request_id, EventType::new(event_type).unwrap(), outcome)
                    .with_model_version(model),
            )
            .unwrap();
    }
}

fn collect(store: &dyn AuditStore, filter: ExportFilter) -> Vec<AuditEvent> {
    store
        .export(filter)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn ids(events: &[AuditEvent]) -> Vec<u64> {
    events.iter().map(|e| e.event_id).collect()
}

// ============================================================================
// Parity
// ============================================================================

#[test]
fn test_backends_answer_identically() {
    let tmp = TempDir::new().unwrap();
    let redactor = redactor();
    let stores: Vec<_> = BACKENDS
        .iter()
        .map(|b| open_store(&config(&tmp, *b)).unwrap())
        .collect();
    for store in &stores {
        populate(store.as_ref(), &redactor);
    }

    let app_1 = redactor.hash_applicant_id("app_1").unwrap();
    let filters = vec![
        ExportFilter::all(),
        ExportFilter::all().request_id("req-a"),
        ExportFilter::all().event_type(EventType::outcome_event()),
        ExportFilter::all()
            .request_id("req-a")
            .event_type(EventType::outcome_event()),
        ExportFilter::all().applicant_ref(app_1.clone()),
        ExportFilter::all().model_version("m2"),
        ExportFilter::all().applicant_ref(app_1).model_version("m2"),
        ExportFilter::all().request_id("missing"),
    ];

    for filter in filters {
        let log = ids(&collect(stores[0].as_ref(), filter.clone()));
        let indexed = ids(&collect(stores[1].as_ref(), filter.clone()));
        assert_eq!(log, indexed, "backends disagree on {filter:?}");
        assert_eq!(
            stores[0].count(filter.clone()).unwrap(),
            stores[1].count(filter.clone()).unwrap()
        );
    }

    assert_eq!(ids(&stores[0].get_by_request_id("req-a").unwrap()), vec![1, 3, 7]);
    assert_eq!(ids(&stores[1].get_by_request_id("req-a").unwrap()), vec![1, 3, 7]);
    assert_eq!(
        ids(&collect(stores[1].as_ref(), ExportFilter::all().model_version("m2"))),
        vec![4, 6, 7]
    );
}

#[test]
fn test_time_range_filters() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config(&tmp, backend)).unwrap();
        populate(store.as_ref(), &redactor());

        let third = store.get(3).unwrap().unwrap();
        let upto_third = collect(store.as_ref(), ExportFilter::all().until(third.created_at));
        assert!(ids(&upto_third).contains(&3));
        assert!(upto_third.iter().all(|e| e.created_at <= third.created_at));

        let future = collect(
            store.as_ref(),
            ExportFilter::all().since(Utc::now() + chrono::Duration::hours(1)),
        );
        assert!(future.is_empty());
    }
}

// ============================================================================
// Reopen
// ============================================================================

#[test]
fn test_reopen_preserves_ids_and_chain() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp, backend);
        let redactor = redactor();
        {
            let store = open_store(&cfg).unwrap();
            populate(store.as_ref(), &redactor);
        }

        let store = open_store(&cfg).unwrap();
        assert_eq!(store.count(ExportFilter::all()).unwrap(), 7);
        assert_eq!(ids(&store.get_by_request_id("req-c").unwrap()), vec![4, 6]);

        let outcome = redactor.redact(&Payload::new().with("outcome", "repaid"), None);
        let id = store
            .append(NewAuditEvent::from_outcome(
                "req-c",
                EventType::outcome_event(),
                outcome,
            ))
            .unwrap();
        assert_eq!(id, 8);

        let previous = store.get(7).unwrap().unwrap();
        let latest = store.get(8).unwrap().unwrap();
        assert_eq!(latest.prev_hash, previous.hash());
        assert!(latest.created_at >= previous.created_at);
        assert!(verify_log(store.path()).unwrap().is_valid);
    }
}

#[test]
fn test_backends_share_file_format() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("audit.jsonl");
    {
        let log = open_store(&StoreConfig::new(StoreBackend::Log, &path)).unwrap();
        populate(log.as_ref(), &redactor());
    }
    let indexed = open_store(&StoreConfig::new(StoreBackend::Indexed, &path)).unwrap();
    assert_eq!(indexed.backend_name(), "indexed");
    assert_eq!(ids(&indexed.get_by_request_id("req-b").unwrap()), vec![2, 5]);
}

// ============================================================================
// Query, count, export
// ============================================================================

#[test]
fn test_query_pages_newest_first() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config(&tmp, backend)).unwrap();
        populate(store.as_ref(), &redactor());

        assert_eq!(ids(&store.query(ExportFilter::all(), 3, 0).unwrap()), vec![7, 6, 5]);
        assert_eq!(ids(&store.query(ExportFilter::all(), 3, 3).unwrap()), vec![4, 3, 2]);
        assert_eq!(ids(&store.query(ExportFilter::all(), 3, 6).unwrap()), vec![1]);
        assert!(store.query(ExportFilter::all(), 3, 10).unwrap().is_empty());

        // limit 0 is clamped up to 1
        assert_eq!(ids(&store.query(ExportFilter::all(), 0, 0).unwrap()), vec![7]);
        assert_eq!(store.query(ExportFilter::all(), MAX_QUERY_LIMIT * 5, 0).unwrap().len(), 7);

        let outcomes = store
            .query(ExportFilter::all().event_type(EventType::outcome_event()), 10, 0)
            .unwrap();
        assert_eq!(ids(&outcomes), vec![7, 5, 3]);
    }
}

#[test]
fn test_export_jsonl_writes_redacted_rows() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config(&tmp, backend)).unwrap();
        populate(store.as_ref(), &redactor());

        let out = tmp.path().join("exports").join("req-a.jsonl");
        let rows = store
            .export_jsonl(ExportFilter::all().request_id("req-a"), &out)
            .unwrap();
        assert_eq!(rows, 3);

        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), 3);
        for line in content.lines() {
            let event: AuditEvent = serde_json::from_str(line).unwrap();
            assert_eq!(event.request_id, "req-a");
            assert!(event.verify_hash());
        }
        assert!(!content.contains("123-45-6789"));
        assert!(!content.contains("app_1"));

        let empty = tmp.path().join("none.jsonl");
        assert_eq!(
            store
                .export_jsonl(ExportFilter::all().request_id("missing"), &empty)
                .unwrap(),
            0
        );
        assert_eq!(std::fs::read_to_string(&empty).unwrap(), "");
    }
}

#[test]
fn test_store_file_never_holds_raw_identifiers() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config(&tmp, backend)).unwrap();
        populate(store.as_ref(), &redactor());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        for canary in ["123-45-6789", "app_1", "app_2", "app_3", "backend-test"] {
            assert!(!raw.contains(canary), "{canary} leaked into {backend} store");
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[test]
fn test_nested_payload_never_reaches_store() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&config(&tmp, backend)).unwrap();
        let recorder = AuditRecorder::new(Arc::new(redactor()), Arc::clone(&store));
        let before = std::fs::metadata(store.path()).unwrap().len();

        let raw = json!({"score": 0.82, "applicant": {"ssn": "123-45-6789", "name": "Jane"}});
        let err = recorder
            .record_json(
                RecordRequest {
                    request_id: "req-nested",
                    event_type: EventType::score_decision(),
                    model_version: None,
                    applicant_id: Some("app_123"),
                },
                raw.as_object().unwrap(),
            )
            .unwrap_err();

        match err {
            RecordError::Redaction(RedactionError::PayloadShape { key, .. }) => {
                assert_eq!(key, "applicant")
            }
            other => panic!("expected payload shape error, got {other:?}"),
        }
        assert_eq!(store.count(ExportFilter::all()).unwrap(), 0);
        assert_eq!(std::fs::metadata(store.path()).unwrap().len(), before);
    }
}
