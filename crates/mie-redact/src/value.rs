//! Closed payload value model.
//!
//! Audit payloads are one level deep: every value is a scalar or a flat
//! sequence of scalars. Anything else is rejected at the boundary with
//! [`RedactionError::PayloadShape`] so the redactor never has to guess how
//! to bound an arbitrary object.

use crate::error::{RedactionError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A single scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Borrow the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    fn from_json(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(b) => Ok(Scalar::Bool(*b)),
            Value::Number(n) => Ok(Scalar::Number(n.clone())),
            Value::String(s) => Ok(Scalar::String(s.clone())),
            Value::Array(_) => Err(RedactionError::shape(
                key,
                "sequence nested inside a sequence",
            )),
            Value::Object(_) => Err(RedactionError::shape(
                key,
                "object nested inside a sequence",
            )),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<f64> for Scalar {
    /// Non-finite floats have no JSON form and become `null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Scalar::Null, Scalar::Number)
    }
}

/// A payload value: a scalar or a flat sequence of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl PayloadValue {
    /// Convert one JSON value, rejecting nested structures.
    ///
    /// `key` is only used to label the error.
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| Scalar::from_json(key, item))
                .collect::<Result<Vec<_>>>()
                .map(PayloadValue::List),
            Value::Object(_) => Err(RedactionError::shape(
                key,
                "nested object; flatten the payload before auditing",
            )),
            other => Scalar::from_json(key, other).map(PayloadValue::Scalar),
        }
    }

    /// Borrow the string content, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Scalar(s) => s.as_str(),
            PayloadValue::List(_) => None,
        }
    }

    /// Borrow the items, if this is a sequence.
    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            PayloadValue::List(items) => Some(items),
            PayloadValue::Scalar(_) => None,
        }
    }
}

impl From<Scalar> for PayloadValue {
    fn from(value: Scalar) -> Self {
        PayloadValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for PayloadValue {
    fn from(items: Vec<Scalar>) -> Self {
        PayloadValue::List(items)
    }
}

macro_rules! scalar_payload_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PayloadValue {
            fn from(value: $ty) -> Self {
                PayloadValue::Scalar(value.into())
            }
        })*
    };
}

scalar_payload_from!(&str, String, bool, i64, f64);

/// A raw, validated payload awaiting redaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    entries: BTreeMap<String, PayloadValue>,
}

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a JSON object into a payload.
    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (key, value) in map {
            entries.insert(key.clone(), PayloadValue::from_json(key, value)?);
        }
        Ok(Self { entries })
    }

    /// Validate an arbitrary JSON value; only objects are accepted at the top level.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_json_map(map),
            _ => Err(RedactionError::shape("$", "payload must be a JSON object")),
        }
    }

    /// Insert a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Insert a value.
    pub fn insert(&mut self, key: impl Into<String>, value: PayloadValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.entries.iter()
    }
}

/// A payload that has been through the redactor.
///
/// The only constructors are [`crate::Redactor`] and `Deserialize`. The
/// latter exists to read stored events back; it checks shape (flat scalars
/// and lists) but applies no policy, so new data must go through the
/// redactor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactedPayload(BTreeMap<String, PayloadValue>);

impl RedactedPayload {
    pub(crate) fn from_entries(entries: BTreeMap<String, PayloadValue>) -> Self {
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PayloadValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON view of the payload.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
