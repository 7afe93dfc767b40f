//! Property tests for the redactor: determinism, allowlist closure,
//! bounding and hash separation.

use mie_redact::{
    HashSalt, Payload, PayloadValue, RedactionPolicy, Redactor, Scalar, CLIP_MARKER_PREFIX,
    TRUNCATION_MARKER,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::Null),
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::from),
        "[a-z0-9 ]{0,40}".prop_map(Scalar::String),
        "\\PC{0,20}".prop_map(Scalar::String),
    ]
}

fn value_strategy() -> impl Strategy<Value = PayloadValue> {
    prop_oneof![
        scalar_strategy().prop_map(PayloadValue::Scalar),
        prop::collection::vec(scalar_strategy(), 0..12).prop_map(PayloadValue::List),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map("[a-f]{1,3}", value_strategy(), 0..10).prop_map(|entries| {
        let mut payload = Payload::new();
        for (key, value) in entries {
            payload.insert(key, value);
        }
        payload
    })
}

fn key_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-f]{1,3}", 0..5)
}

prop_compose! {
    fn policy_strategy()(
        allowed in key_set(),
        hashed in key_set(),
        drop_unknown in any::<bool>(),
        hash_id in any::<bool>(),
        remove_id in any::<bool>(),
        max_len in 0usize..20,
        max_items in 0usize..5,
    ) -> RedactionPolicy {
        RedactionPolicy::builder()
            .allowed_payload_keys(allowed)
            .hash_payload_keys(hashed)
            .drop_unknown_keys(drop_unknown)
            .hash_applicant_id(hash_id)
            .remove_applicant_id(remove_id)
            .max_string_length(max_len)
            .max_list_items(max_items)
            .hash_salt(HashSalt::new("prop-salt"))
            .build()
            .unwrap()
    }
}

fn is_marker(s: &str) -> bool {
    s.starts_with(CLIP_MARKER_PREFIX)
}

proptest! {
    #[test]
    fn prop_redaction_is_deterministic(
        policy in policy_strategy(),
        payload in payload_strategy(),
        id in proptest::option::of("[a-z0-9_]{1,12}"),
    ) {
        let redactor = Redactor::new(policy);
        let a = serde_json::to_vec(&redactor.redact(&payload, id.as_deref())).unwrap();
        let b = serde_json::to_vec(&redactor.redact(&payload, id.as_deref())).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_allowlist_closure(policy in policy_strategy(), payload in payload_strategy()) {
        prop_assume!(policy.drop_unknown_keys());
        let redactor = Redactor::new(policy.clone());
        let out = redactor.redact(&payload, None);
        for key in out.payload.keys() {
            prop_assert!(
                policy.allowed_payload_keys().contains(key)
                    || policy.hash_payload_keys().contains(key),
                "key {} survived but is neither allowed nor hashed", key
            );
        }
    }

    #[test]
    fn prop_values_are_bounded(policy in policy_strategy(), payload in payload_strategy()) {
        let max_len = policy.max_string_length();
        let max_items = policy.max_list_items();
        let redactor = Redactor::new(policy);
        let out = redactor.redact(&payload, None);
        let marker_len = TRUNCATION_MARKER.chars().count();

        for (_, value) in out.payload.iter() {
            match value {
                PayloadValue::Scalar(Scalar::String(s)) => {
                    prop_assert!(s.chars().count() <= max_len + marker_len);
                }
                PayloadValue::List(items) => {
                    let real: Vec<_> = items
                        .iter()
                        .filter(|i| !i.as_str().is_some_and(is_marker))
                        .collect();
                    prop_assert!(real.len() <= max_items);
                    prop_assert!(items.len() <= max_items + 1);
                    for item in real {
                        if let Scalar::String(s) = item {
                            prop_assert!(s.chars().count() <= max_len + marker_len);
                        }
                    }
                }
                PayloadValue::Scalar(_) => {}
            }
        }
    }

    #[test]
    fn prop_distinct_ids_distinct_refs(a in "[a-z0-9_]{1,16}", b in "[a-z0-9_]{1,16}") {
        prop_assume!(a != b);
        let policy = RedactionPolicy::builder()
            .hash_salt(HashSalt::new("prop-salt"))
            .build()
            .unwrap();
        let redactor = Redactor::new(policy);
        let ra = redactor.applicant_ref(Some(&a)).unwrap();
        let rb = redactor.applicant_ref(Some(&b)).unwrap();
        prop_assert_ne!(&ra, &rb);
        prop_assert!(mie_redact::is_hashed(&ra));
    }
}
