//! Fuzz target for audit settings parsing and validation.
//!
//! Tests that JSON and TOML settings handle arbitrary input without
//! panicking, including through policy validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mie_config::{build_policy, AuditSettings};

fuzz_target!(|data: &[u8]| {
    if let Ok(settings) = serde_json::from_slice::<AuditSettings>(data) {
        let _ = build_policy(&settings);
    }
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(settings) = toml::from_str::<AuditSettings>(text) {
            let _ = build_policy(&settings);
        }
    }
});
