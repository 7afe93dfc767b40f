//! Fuzz target for payload validation and redaction.
//!
//! Structured payloads (flat, listed and nested values under both known and
//! unknown keys) must either be rejected with a shape error or produce a
//! payload whose keys are all allowed or hashed and whose values are bounded.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mie_redact::{HashSalt, PayloadValue, RedactionError, RedactionPolicy, Redactor, Scalar};
use serde_json::{Map, Value};
use std::sync::OnceLock;

const KNOWN_KEYS: [&str; 6] = ["score", "decision", "reason_codes", "email", "ssn", "name"];

#[derive(Debug, Arbitrary)]
enum FuzzKey {
    Known(u8),
    Other(String),
}

impl FuzzKey {
    fn name(&self) -> String {
        match self {
            FuzzKey::Known(i) => KNOWN_KEYS[usize::from(*i) % KNOWN_KEYS.len()].to_string(),
            FuzzKey::Other(s) => s.clone(),
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzScalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FuzzScalar {
    fn to_json(&self) -> Value {
        match self {
            FuzzScalar::Null => Value::Null,
            FuzzScalar::Bool(b) => Value::Bool(*b),
            FuzzScalar::Int(i) => Value::from(*i),
            FuzzScalar::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FuzzScalar::Text(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Scalar(FuzzScalar),
    List(Vec<FuzzScalar>),
    NestedList(Vec<Vec<FuzzScalar>>),
    Object(Vec<(String, FuzzScalar)>),
}

impl FuzzValue {
    fn to_json(&self) -> Value {
        match self {
            FuzzValue::Scalar(s) => s.to_json(),
            FuzzValue::List(items) => Value::Array(items.iter().map(FuzzScalar::to_json).collect()),
            FuzzValue::NestedList(lists) => Value::Array(
                lists
                    .iter()
                    .map(|items| Value::Array(items.iter().map(FuzzScalar::to_json).collect()))
                    .collect(),
            ),
            FuzzValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    entries: Vec<(FuzzKey, FuzzValue)>,
    applicant_id: Option<String>,
}

const MAX_STRING: usize = 16;
const MAX_ITEMS: usize = 4;

fn redactor() -> &'static Redactor {
    static REDACTOR: OnceLock<Redactor> = OnceLock::new();
    REDACTOR.get_or_init(|| {
        let policy = RedactionPolicy::builder()
            .allowed_payload_keys(["score", "decision", "reason_codes"])
            .hash_payload_keys(["email"])
            .max_string_length(MAX_STRING)
            .max_list_items(MAX_ITEMS)
            .hash_salt(HashSalt::new("fuzz-salt"))
            .build()
            .expect("fuzz policy is valid");
        Redactor::new(policy)
    })
}

fn bounded(s: &str) -> bool {
    s.chars().count() <= MAX_STRING + "…[TRUNCATED]".chars().count() || s.starts_with("[HASH:")
}

fuzz_target!(|input: FuzzInput| {
    let mut map = Map::new();
    for (key, value) in &input.entries {
        map.insert(key.name(), value.to_json());
    }
    let nested = map.values().any(|value| match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(|i| i.is_array() || i.is_object()),
        _ => false,
    });

    let outcome = match redactor().redact_json(&map, input.applicant_id.as_deref()) {
        Ok(outcome) => outcome,
        Err(RedactionError::PayloadShape { .. }) => {
            assert!(nested, "flat payload rejected: {map:?}");
            return;
        }
        Err(other) => panic!("unexpected redaction error: {other:?}"),
    };

    if let (Some(id), Some(reference)) = (&input.applicant_id, &outcome.applicant_ref) {
        assert!(reference.starts_with("[HASH:"));
        assert_ne!(reference, id);
    }

    for (key, value) in outcome.payload.iter() {
        assert!(matches!(key, "score" | "decision" | "reason_codes" | "email"));
        match value {
            PayloadValue::Scalar(Scalar::String(s)) => assert!(bounded(s)),
            PayloadValue::Scalar(_) => {}
            PayloadValue::List(items) => {
                assert!(items.len() <= MAX_ITEMS + 1);
                for item in items {
                    if let Scalar::String(s) = item {
                        assert!(bounded(s) || s.starts_with("[CLIPPED:"));
                    }
                }
            }
        }
    }
});
