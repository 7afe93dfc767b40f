//! Canonical string form of payload values.
//!
//! Hashed payload values are hashed over their canonical string so that the
//! same logical value always produces the same digest, whatever the caller's
//! JSON formatting was.

use crate::value::{PayloadValue, Scalar};

/// Current canonicalization version. Changes when rules are modified.
pub const CANONICALIZATION_VERSION: &str = "1.0.0";

/// Canonical string for a payload value.
///
/// - strings are used verbatim
/// - numbers use serde_json's shortest round-trip form
/// - booleans are `true` / `false`, null is `null`
/// - sequences are compact JSON
pub fn canonical_string(value: &PayloadValue) -> String {
    match value {
        PayloadValue::Scalar(scalar) => canonical_scalar(scalar),
        PayloadValue::List(items) => {
            serde_json::to_string(items).unwrap_or_else(|_| String::from("[]"))
        }
    }
}

fn canonical_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => "null".to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Number(n) => n.to_string(),
        Scalar::String(s) => s.clone(),
    }
}
