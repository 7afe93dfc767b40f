//! Property tests for paging and filtering on both backends.

use mie_audit::{open_store, AuditStore, EventType, ExportFilter, NewAuditEvent, StoreBackend, StoreConfig};
use mie_redact::{HashSalt, Payload, RedactionPolicy, Redactor};
use proptest::prelude::*;
use tempfile::TempDir;

fn redactor() -> Redactor {
    Redactor::new(
        RedactionPolicy::builder()
            .allowed_payload_keys(["score"])
            .hash_salt(HashSalt::new("paging-props"))
            .build()
            .unwrap(),
    )
}

fn backend() -> impl Strategy<Value = StoreBackend> {
    prop_oneof![Just(StoreBackend::Log), Just(StoreBackend::Indexed)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// `query` is the newest-first view of `export`, cut by offset and limit,
    /// and `count` agrees with it.
    #[test]
    fn query_pages_match_reversed_export(
        backend in backend(),
        requests in prop::collection::vec(0u8..3, 1..20),
        filter_request in prop::option::of(0u8..3),
        limit in 1usize..8,
        offset in 0usize..24,
    ) {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&StoreConfig::new(backend, tmp.path().join("audit.jsonl"))).unwrap();
        let redactor = redactor();
        for (i, r) in requests.iter().enumerate() {
            let outcome = redactor.redact(&Payload::new().with("score", i as i64), None);
            let event_type = if i % 2 == 0 { EventType::score_decision() } else { EventType::outcome_event() };
            store
                .append(NewAuditEvent::from_outcome(format!("req-{r}"), event_type, outcome))
                .unwrap();
        }

        let filter = match filter_request {
            Some(r) => ExportFilter::all().request_id(format!("req-{r}")),
            None => ExportFilter::all(),
        };

        let exported: Vec<u64> = store
            .export(filter.clone())
            .unwrap()
            .map(|e| e.unwrap().event_id)
            .collect();
        let expected: Vec<u64> = exported.iter().rev().skip(offset).take(limit).copied().collect();
        let page: Vec<u64> = store
            .query(filter.clone(), limit, offset)
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();

        prop_assert_eq!(page, expected);
        prop_assert_eq!(store.count(filter).unwrap(), exported.len());
        prop_assert!(exported.windows(2).all(|w| w[0] < w[1]));
    }
}
