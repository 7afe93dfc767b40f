//! MIE audit trail core library.
//!
//! Shared plumbing for the `mie-core` binary: exit codes, logging setup and
//! the command implementations over [`mie_audit`], [`mie_redact`] and
//! [`mie_config`].

pub mod commands;
pub mod exit_codes;
pub mod logging;
