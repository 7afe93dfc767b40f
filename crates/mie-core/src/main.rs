//! MIE Audit Core - redaction and audit trail CLI
//!
//! The main entry point for mie-core, handling:
//! - Redaction policy inspection and dry runs
//! - Recording redacted scoring decisions and outcome events
//! - Querying and exporting the audit store
//! - Hash chain verification

use clap::{Args, Parser, Subcommand};
use mie_core::commands::{self, CliError, Context, FilterOptions, RecordOptions};
use mie_core::exit_codes::ExitCode;
use mie_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use serde::Serialize;
use std::path::PathBuf;

/// MIE Audit Core - privacy-preserving audit trail for credit decisions
#[derive(Parser)]
#[command(name = "mie-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Audit settings file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for stderr
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format for stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Redaction policy management
    Policy(PolicyArgs),

    /// Redact a payload without storing it
    Redact(RedactArgs),

    /// Redact and durably record one audit event
    Record(RecordArgs),

    /// List stored events, newest first
    Events(EventsArgs),

    /// Show one stored event by id
    Show(ShowArgs),

    /// Export matching events as JSON Lines
    Export(ExportArgs),

    /// Verify the hash chain of an audit store file
    Verify(VerifyArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct PolicyArgs {
    #[command(subcommand)]
    command: PolicyCommands,
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Show the effective configuration (the salt is never printed)
    Show,
    /// Generate a random hash salt for a new deployment
    GenSalt,
}

#[derive(Args, Debug)]
struct RedactArgs {
    /// Payload JSON file ('-' or omitted for stdin)
    #[arg(long, short = 'i', visible_alias = "payload-file")]
    input: Option<PathBuf>,

    /// Raw applicant identifier
    #[arg(long)]
    applicant_id: Option<String>,
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Payload JSON file ('-' or omitted for stdin)
    #[arg(long, short = 'i', visible_alias = "payload-file")]
    input: Option<PathBuf>,

    /// Request id (generated when omitted)
    #[arg(long)]
    request_id: Option<String>,

    /// Event type tag
    #[arg(long, default_value = "score_decision")]
    event_type: String,

    /// Scoring model version
    #[arg(long)]
    model_version: Option<String>,

    /// Raw applicant identifier
    #[arg(long)]
    applicant_id: Option<String>,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only events for this request id
    #[arg(long)]
    request_id: Option<String>,

    /// Only events of this type
    #[arg(long)]
    event_type: Option<String>,

    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    since: Option<String>,

    /// Inclusive upper bound (RFC 3339)
    #[arg(long)]
    until: Option<String>,

    /// Raw applicant id, hashed with the configured salt before matching
    #[arg(long, conflicts_with = "applicant_ref")]
    applicant_id: Option<String>,

    /// Hashed applicant reference as stored
    #[arg(long)]
    applicant_ref: Option<String>,

    /// Only events from this model version
    #[arg(long)]
    model_version: Option<String>,
}

impl FilterArgs {
    fn options(&self) -> FilterOptions {
        FilterOptions {
            request_id: self.request_id.clone(),
            event_type: self.event_type.clone(),
            since: self.since.clone(),
            until: self.until.clone(),
            applicant_id: self.applicant_id.clone(),
            applicant_ref: self.applicant_ref.clone(),
            model_version: self.model_version.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct EventsArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Maximum events to return (1-1000)
    #[arg(long, default_value_t = commands::DEFAULT_EVENTS_LIMIT)]
    limit: usize,

    /// Events to skip from the newest
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Event id
    event_id: u64,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output file
    out: PathBuf,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Store file to verify (defaults to the configured store)
    #[arg(long)]
    path: Option<PathBuf>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::Clean
                }
                _ => ExitCode::ArgsError,
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    let cli_level = cli.global.log_level.or(if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    });
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let ctx = Context::new(cli.global.config.clone());
    let exit_code = match run(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => output_error(&e),
    };

    std::process::exit(exit_code.as_i32());
}

fn run(ctx: &Context, command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Policy(args) => match args.command {
            PolicyCommands::Show => emit(&commands::policy_show(ctx)?),
            PolicyCommands::GenSalt => emit(&commands::gen_salt()?),
        },
        Commands::Redact(args) => {
            let payload = commands::read_payload(args.input.as_deref())?;
            emit(&commands::redact(ctx, &payload, args.applicant_id.as_deref())?)
        }
        Commands::Record(args) => {
            let payload = commands::read_payload(args.input.as_deref())?;
            let options = RecordOptions {
                request_id: args.request_id,
                event_type: Some(args.event_type),
                model_version: args.model_version,
                applicant_id: args.applicant_id,
            };
            emit(&commands::record(ctx, &options, &payload)?)
        }
        Commands::Events(args) => emit(&commands::events(
            ctx,
            &args.filter.options(),
            args.limit,
            args.offset,
        )?),
        Commands::Show(args) => emit(&commands::show(ctx, args.event_id)?),
        Commands::Export(args) => {
            emit(&commands::export(ctx, &args.filter.options(), &args.out)?)
        }
        Commands::Verify(args) => {
            let report = commands::verify(ctx, args.path.as_deref())?;
            emit(&report)?;
            Ok(if report.result.is_valid {
                ExitCode::Clean
            } else {
                ExitCode::IntegrityError
            })
        }
    }
}

/// Print a command result as pretty JSON on stdout.
fn emit<T: Serialize>(value: &T) -> Result<ExitCode, CliError> {
    let text = serde_json::to_string_pretty(value).map_err(CliError::Output)?;
    println!("{text}");
    Ok(ExitCode::Clean)
}

fn output_error(error: &CliError) -> ExitCode {
    let exit_code = error.exit_code();
    let mut response = serde_json::json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "error",
        "error": {
            "code": exit_code.code_name(),
            "exit_code": exit_code.as_i32(),
            "message": error.to_string(),
        }
    });
    if let Some(code) = error.config_code() {
        response["error"]["config_code"] = serde_json::json!(code);
    }
    match serde_json::to_string_pretty(&response) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("error: {error}"),
    }
    exit_code
}
