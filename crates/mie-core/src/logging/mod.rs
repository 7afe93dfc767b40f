//! Structured logging for mie-core.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for pipelines
//!
//! # Design Notes
//!
//! - stdout is reserved for command payloads (JSON output)
//! - stderr receives all log output (human or JSONL)
//! - Library crates log key names, ids and counts; never payload values,
//!   raw applicant ids or the hash salt

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the configured level.
const LOG_TARGETS: &[&str] = &["mie_core", "mie_audit", "mie_redact", "mie_config"];

/// Filter directives for `level` across the workspace crates.
pub fn default_directives(level: LogLevel) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging subsystem.
///
/// Call once at startup; later calls are ignored. `RUST_LOG`, when set to a
/// valid filter, replaces the default directives.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}

/// Generate a request id for events recorded without one.
pub fn generate_request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}
