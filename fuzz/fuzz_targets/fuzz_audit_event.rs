//! Fuzz target for persisted audit record parsing.
//!
//! A store file may be damaged or edited; parsing and hash checks must
//! never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mie_audit::AuditEvent;

fuzz_target!(|data: &[u8]| {
    if let Ok(event) = serde_json::from_slice::<AuditEvent>(data) {
        let _ = event.verify_hash();
        let _ = event.digest();
    }
});
