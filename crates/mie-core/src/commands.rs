//! Command implementations behind the `mie-core` binary.
//!
//! Each command returns a serializable result; the binary owns printing and
//! exit codes. Nothing here writes raw payload values, raw applicant ids or
//! the hash salt to logs.

use crate::exit_codes::ExitCode;
use crate::logging::generate_request_id;
use chrono::{DateTime, Utc};
use mie_audit::{
    open_store, verify_log, AuditError, AuditEvent, AuditRecorder, AuditStore, EventType,
    ExportFilter, RecordError, RecordReceipt, RecordRequest, StoreConfig, VerificationResult,
};
use mie_config::{load_config, load_store_config, ConfigError, ConfigSnapshot, LoadedConfig};
use mie_redact::{ApplicantIdHandling, HashSalt, RedactionError, RedactionOutcome, Redactor, SALT_BYTES};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Default page size for `events`.
pub const DEFAULT_EVENTS_LIMIT: usize = 50;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Args(String),

    #[error("failed to read input {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input is not valid JSON: {0}")]
    InputJson(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Redaction(#[from] RedactionError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("no audit event with id {0}")]
    EventNotFound(u64),

    #[error("failed to serialize output: {0}")]
    Output(#[source] serde_json::Error),
}

impl From<RecordError> for CliError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Redaction(e) => CliError::Redaction(e),
            RecordError::Store(e) => CliError::Audit(e),
        }
    }
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Args(_)
            | CliError::Input { .. }
            | CliError::InputJson(_)
            | CliError::EventNotFound(_) => ExitCode::ArgsError,
            CliError::Config(_) => ExitCode::ConfigError,
            CliError::Redaction(e) if e.is_configuration() => ExitCode::ConfigError,
            CliError::Redaction(_) => ExitCode::PayloadShapeError,
            CliError::Audit(e) => match e {
                _ if e.is_write_failure() => ExitCode::StoreWriteError,
                AuditError::Integrity { .. } => ExitCode::IntegrityError,
                AuditError::InvalidEventType { .. } => ExitCode::ArgsError,
                AuditError::DataDirUnavailable => ExitCode::ConfigError,
                AuditError::Serialization { .. } | AuditError::LockPoisoned => {
                    ExitCode::InternalError
                }
                _ => ExitCode::StoreReadError,
            },
            CliError::Output(_) => ExitCode::InternalError,
        }
    }

    /// Finer-grained code for configuration failures.
    pub fn config_code(&self) -> Option<u32> {
        match self {
            CliError::Config(e) => Some(e.code()),
            _ => None,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Where configuration comes from for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config_path: Option<PathBuf>,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Context { config_path }
    }

    /// Full configuration, including a validated redaction policy.
    pub fn load(&self) -> CliResult<LoadedConfig> {
        Ok(load_config(self.config_path.as_deref())?)
    }

    /// Store location only. Works without a hash salt.
    pub fn store_config(&self) -> CliResult<StoreConfig> {
        Ok(load_store_config(self.config_path.as_deref())?)
    }

    fn open_store(&self) -> CliResult<Arc<dyn AuditStore>> {
        let config = self.store_config()?;
        debug!(backend = %config.backend, path = %config.path.display(), "opening audit store");
        Ok(open_store(&config)?)
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Raw filter options as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub request_id: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    /// Raw applicant id; hashed with the configured salt before matching.
    pub applicant_id: Option<String>,
    /// Already hashed applicant reference.
    pub applicant_ref: Option<String>,
    pub model_version: Option<String>,
}

impl FilterOptions {
    /// Build a store filter. Only loads the redaction policy when a raw
    /// applicant id has to be hashed.
    pub fn to_filter(&self, ctx: &Context) -> CliResult<ExportFilter> {
        let mut filter = ExportFilter::all();
        if let Some(request_id) = &self.request_id {
            filter = filter.request_id(request_id.clone());
        }
        if let Some(tag) = &self.event_type {
            filter = filter.event_type(EventType::new(tag.clone())?);
        }

        let since = self.since.as_deref().map(|s| parse_time("--since", s)).transpose()?;
        let until = self.until.as_deref().map(|s| parse_time("--until", s)).transpose()?;
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return Err(CliError::Args(
                    "--since must not be later than --until".to_string(),
                ));
            }
        }
        if let Some(since) = since {
            filter = filter.since(since);
        }
        if let Some(until) = until {
            filter = filter.until(until);
        }

        match (&self.applicant_id, &self.applicant_ref) {
            (Some(_), Some(_)) => {
                return Err(CliError::Args(
                    "--applicant-id and --applicant-ref are mutually exclusive".to_string(),
                ))
            }
            (Some(raw), None) => {
                let redactor = Redactor::new(ctx.load()?.policy);
                let reference = match redactor.policy().applicant_id_handling() {
                    ApplicantIdHandling::Hash => redactor.hash_applicant_id(raw)?,
                    ApplicantIdHandling::Clear => raw.clone(),
                    ApplicantIdHandling::Remove => {
                        return Err(CliError::Args(
                            "--applicant-id cannot match: the active policy removes applicant ids"
                                .to_string(),
                        ))
                    }
                };
                filter = filter.applicant_ref(reference);
            }
            (None, Some(reference)) => filter = filter.applicant_ref(reference.clone()),
            (None, None) => {}
        }

        if let Some(model_version) = &self.model_version {
            filter = filter.model_version(model_version.clone());
        }
        Ok(filter)
    }
}

fn parse_time(flag: &str, value: &str) -> CliResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CliError::Args(format!("{flag}: invalid RFC 3339 timestamp {value:?}: {e}")))
}

// ============================================================================
// Input
// ============================================================================

/// Read a JSON payload from a file, or stdin for `None` / `-`.
pub fn read_payload(input: Option<&Path>) -> CliResult<Value> {
    let mut text = String::new();
    match input {
        Some(path) if path != Path::new("-") => {
            text = std::fs::read_to_string(path).map_err(|source| CliError::Input {
                path: path.display().to_string(),
                source,
            })?;
        }
        _ => {
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|source| CliError::Input {
                    path: "<stdin>".to_string(),
                    source,
                })?;
        }
    }
    Ok(serde_json::from_str(&text)?)
}

fn payload_object(value: &Value) -> CliResult<&serde_json::Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        CliError::Redaction(RedactionError::PayloadShape {
            key: "$".to_string(),
            reason: "payload must be a JSON object".to_string(),
        })
    })
}

// ============================================================================
// Commands
// ============================================================================

/// `policy show`: the effective configuration, without the salt.
pub fn policy_show(ctx: &Context) -> CliResult<ConfigSnapshot> {
    Ok(ctx.load()?.snapshot)
}

#[derive(Debug, Serialize)]
pub struct GeneratedSalt {
    pub hash_salt: String,
    pub bytes: usize,
}

/// `policy gen-salt`: a fresh random salt for a new deployment.
pub fn gen_salt() -> CliResult<GeneratedSalt> {
    let salt = HashSalt::generate()?;
    Ok(GeneratedSalt {
        hash_salt: salt.reveal().to_string(),
        bytes: SALT_BYTES,
    })
}

/// `redact`: dry-run redaction. Nothing is stored.
pub fn redact(ctx: &Context, payload: &Value, applicant_id: Option<&str>) -> CliResult<RedactionOutcome> {
    let loaded = ctx.load()?;
    let redactor = Redactor::new(loaded.policy);
    Ok(redactor.redact_json(payload_object(payload)?, applicant_id)?)
}

/// Arguments for `record`.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub request_id: Option<String>,
    pub event_type: Option<String>,
    pub model_version: Option<String>,
    pub applicant_id: Option<String>,
}

/// `record`: redact and durably append one event.
pub fn record(ctx: &Context, options: &RecordOptions, payload: &Value) -> CliResult<RecordReceipt> {
    let event_type = match &options.event_type {
        Some(tag) => EventType::new(tag.clone())?,
        None => EventType::score_decision(),
    };
    let raw = payload_object(payload)?;

    let loaded = ctx.load()?;
    let store = open_store(&loaded.store)?;
    let recorder = AuditRecorder::new(Arc::new(Redactor::new(loaded.policy)), store);

    let request_id = options
        .request_id
        .clone()
        .unwrap_or_else(generate_request_id);
    let receipt = recorder.record_json(
        RecordRequest {
            request_id: &request_id,
            event_type,
            model_version: options.model_version.as_deref(),
            applicant_id: options.applicant_id.as_deref(),
        },
        raw,
    )?;
    info!(
        event_id = receipt.event_id,
        request_id = %receipt.request_id,
        backend = recorder.store().backend_name(),
        "event recorded"
    );
    Ok(receipt)
}

/// One page of `events` output.
#[derive(Debug, Serialize)]
pub struct EventsPage {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub events: Vec<AuditEvent>,
}

/// `events`: matching events, newest first.
pub fn events(ctx: &Context, filter: &FilterOptions, limit: usize, offset: usize) -> CliResult<EventsPage> {
    let filter = filter.to_filter(ctx)?;
    let store = ctx.open_store()?;
    let total = store.count(filter.clone())?;
    let limit = limit.clamp(1, mie_audit::MAX_QUERY_LIMIT);
    let events = store.query(filter, limit, offset)?;
    Ok(EventsPage {
        total,
        limit,
        offset,
        events,
    })
}

/// `show`: a single event by id.
pub fn show(ctx: &Context, event_id: u64) -> CliResult<AuditEvent> {
    ctx.open_store()?
        .get(event_id)?
        .ok_or(CliError::EventNotFound(event_id))
}

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub out_path: String,
    pub rows_written: usize,
}

/// `export`: matching events in append order, as JSON Lines.
pub fn export(ctx: &Context, filter: &FilterOptions, out: &Path) -> CliResult<ExportSummary> {
    let filter = filter.to_filter(ctx)?;
    let store = ctx.open_store()?;
    let rows_written = store.export_jsonl(filter, out)?;
    info!(rows = rows_written, out = %out.display(), "audit export written");
    Ok(ExportSummary {
        out_path: out.display().to_string(),
        rows_written,
    })
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub path: String,
    #[serde(flatten)]
    pub result: VerificationResult,
}

/// `verify`: check the hash chain of a store file.
pub fn verify(ctx: &Context, path: Option<&Path>) -> CliResult<VerifyReport> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => ctx.store_config()?.path,
    };
    let result = verify_log(&path)?;
    Ok(VerifyReport {
        path: path.display().to_string(),
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(
            CliError::Args("x".to_string()).exit_code(),
            ExitCode::ArgsError
        );
        assert_eq!(
            CliError::Redaction(RedactionError::Configuration("no salt".to_string())).exit_code(),
            ExitCode::ConfigError
        );
        assert_eq!(
            CliError::Redaction(RedactionError::PayloadShape {
                key: "k".to_string(),
                reason: "nested".to_string()
            })
            .exit_code(),
            ExitCode::PayloadShapeError
        );
        assert_eq!(
            CliError::Audit(AuditError::Poisoned {
                path: PathBuf::from("/tmp/a")
            })
            .exit_code(),
            ExitCode::StoreWriteError
        );
        assert_eq!(
            CliError::Audit(AuditError::Integrity {
                message: "ids".to_string()
            })
            .exit_code(),
            ExitCode::IntegrityError
        );
        assert_eq!(
            CliError::Audit(AuditError::LockPoisoned).exit_code(),
            ExitCode::InternalError
        );
    }

    #[test]
    fn test_config_code_only_for_config_errors() {
        let invalid = CliError::Config(ConfigError::InvalidValue {
            field: "max_list_items".to_string(),
            message: "must not be negative".to_string(),
        });
        assert_eq!(invalid.config_code(), Some(65));
        assert_eq!(CliError::Args("x".to_string()).config_code(), None);
    }

    #[test]
    fn test_filter_rejects_bad_times() {
        let ctx = Context::default();
        let opts = FilterOptions {
            since: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(matches!(opts.to_filter(&ctx), Err(CliError::Args(_))));

        let opts = FilterOptions {
            since: Some("2026-01-02T00:00:00Z".to_string()),
            until: Some("2026-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(matches!(opts.to_filter(&ctx), Err(CliError::Args(_))));
    }

    #[test]
    fn test_filter_without_applicant_id_needs_no_policy() {
        let ctx = Context::default();
        let opts = FilterOptions {
            request_id: Some("req-1".to_string()),
            event_type: Some("outcome_event".to_string()),
            since: Some("2026-01-01T00:00:00+02:00".to_string()),
            applicant_ref: Some("[HASH:k1:abc]".to_string()),
            ..Default::default()
        };
        let filter = opts.to_filter(&ctx).unwrap();
        assert_eq!(filter.request_id.as_deref(), Some("req-1"));
        assert_eq!(filter.applicant_ref.as_deref(), Some("[HASH:k1:abc]"));
        assert_eq!(
            filter.time_range.and_then(|r| r.since).map(|t| t.to_rfc3339()),
            Some("2025-12-31T22:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_filter_rejects_both_applicant_forms() {
        let opts = FilterOptions {
            applicant_id: Some("app".to_string()),
            applicant_ref: Some("[HASH:k1:abc]".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            opts.to_filter(&Context::default()),
            Err(CliError::Args(_))
        ));
    }

    #[test]
    fn test_payload_must_be_object() {
        let err = payload_object(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::PayloadShapeError);
    }

    #[test]
    fn test_gen_salt_is_fresh() {
        let a = gen_salt().unwrap();
        let b = gen_salt().unwrap();
        assert_ne!(a.hash_salt, b.hash_salt);
        assert_eq!(a.bytes, SALT_BYTES);
    }
}
