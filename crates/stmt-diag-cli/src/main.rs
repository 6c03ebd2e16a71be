// crates/stmt-diag-cli/src/main.rs
// ============================================================================
// Module: Statement Diagnostics CLI Entry Point
// Description: Command dispatcher for diagnostics request administration.
// Purpose: Insert requests, inspect stored traces, and drive reconciliation.
// Dependencies: clap, serde, serde_json, stmt-diag-core, stmt-diag-config, thiserror
// ============================================================================

//! ## Overview
//! `stmt-diag` opens the configured `SQLite` store and a registry over it, then
//! runs one administrative command. Machine-readable output is JSON; errors go
//! to stderr with a failure exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::json;
use stmt_diag_config::StmtDiagConfig;
use stmt_diag_core::DiagnosticsRegistry;
use stmt_diag_core::DiagnosticsStore;
use stmt_diag_core::Fingerprint;
use stmt_diag_core::NoopBroadcaster;
use stmt_diag_core::StmtDiagnosticsRequester;
use stmt_diag_core::TraceId;
use stmt_diag_core::normalize_sql;
use stmt_diag_core::spawn_poller;
use stmt_diag_store_sqlite::SqliteDiagnosticsStore;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stmt-diag", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `STMT_DIAG_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Request diagnostics for the next execution of a statement.
    Request(RequestCommand),
    /// List stored requests as JSON lines.
    Requests(RequestsCommand),
    /// Print one stored trace as JSON.
    Trace(TraceCommand),
    /// Run one reconciliation and print the report.
    Poll,
    /// Run reconciliation periodically at the configured interval.
    Watch(WatchCommand),
}

/// Arguments for `request`.
#[derive(Args, Debug)]
struct RequestCommand {
    /// Statement fingerprint, already normalized.
    #[arg(
        value_name = "FINGERPRINT",
        required_unless_present = "statement",
        conflicts_with = "statement"
    )]
    fingerprint: Option<String>,
    /// Literal SQL to normalize into a fingerprint.
    #[arg(long, value_name = "SQL")]
    statement: Option<String>,
}

/// Arguments for `requests`.
#[derive(Args, Debug)]
struct RequestsCommand {
    /// Only list requests that have not been completed.
    #[arg(long)]
    pending: bool,
}

/// Arguments for `trace`.
#[derive(Args, Debug)]
struct TraceCommand {
    /// Trace identifier.
    #[arg(value_name = "ID")]
    id: u64,
}

/// Arguments for `watch`.
#[derive(Args, Debug)]
struct WatchCommand {
    /// Stop after this many reconciliations.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1 ..))]
    iterations: Option<u64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Loads configuration and executes the selected command.
fn run(cli: Cli, out: &mut dyn Write) -> CliResult<()> {
    let config = StmtDiagConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    dispatch(&config, cli.command, out)
}

/// Executes one command against the configured store.
fn dispatch(config: &StmtDiagConfig, command: Commands, out: &mut dyn Write) -> CliResult<()> {
    let context = CliContext::open(config)?;
    match command {
        Commands::Request(command) => command_request(&context, command, out),
        Commands::Requests(command) => command_requests(&context, &command, out),
        Commands::Trace(command) => command_trace(&context, &command, out),
        Commands::Poll => command_poll(&context, out),
        Commands::Watch(command) => command_watch(config, context, &command, out),
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Store and registry opened from configuration.
struct CliContext {
    /// Durable store handle for inspection commands.
    store: SqliteDiagnosticsStore,
    /// Registry over the same store.
    registry: DiagnosticsRegistry,
}

impl CliContext {
    /// Opens the store, the event sink, and a registry over them.
    fn open(config: &StmtDiagConfig) -> CliResult<Self> {
        let store = SqliteDiagnosticsStore::new(&config.store)
            .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
        let events = config
            .logging
            .open_sink()
            .map_err(|err| CliError::new(format!("failed to open event log: {err}")))?;
        let registry = DiagnosticsRegistry::new(
            Arc::new(store.clone()),
            Arc::new(NoopBroadcaster),
            events,
            config.registry.registry_config(),
        );
        Ok(Self {
            store,
            registry,
        })
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Inserts a diagnostics request and prints its id.
fn command_request(
    context: &CliContext,
    command: RequestCommand,
    out: &mut dyn Write,
) -> CliResult<()> {
    let fingerprint = match (command.fingerprint, command.statement) {
        (Some(fingerprint), None) => Fingerprint::new(fingerprint),
        (None, Some(sql)) => normalize_sql(&sql),
        _ => {
            return Err(CliError::new(
                "exactly one of FINGERPRINT or --statement is required".to_string(),
            ));
        }
    };
    let requester: &dyn StmtDiagnosticsRequester = &context.registry;
    let id = requester
        .insert_request(&fingerprint)
        .map_err(|err| CliError::new(format!("failed to insert request: {err}")))?;
    write_json_line(out, &json!({ "id": id, "fingerprint": fingerprint }))
}

/// Lists stored requests.
fn command_requests(
    context: &CliContext,
    command: &RequestsCommand,
    out: &mut dyn Write,
) -> CliResult<()> {
    let requests = context
        .store
        .requests()
        .map_err(|err| CliError::new(format!("failed to list requests: {err}")))?;
    for request in requests.iter().filter(|request| !command.pending || !request.completed) {
        write_json_line(out, request)?;
    }
    Ok(())
}

/// Prints one stored trace.
fn command_trace(context: &CliContext, command: &TraceCommand, out: &mut dyn Write) -> CliResult<()> {
    let id = TraceId::from_raw(command.id)
        .ok_or_else(|| CliError::new("trace id must be non-zero".to_string()))?;
    let trace = context
        .store
        .trace(id)
        .map_err(|err| CliError::new(format!("failed to load trace: {err}")))?
        .ok_or_else(|| CliError::new(format!("trace {} not found", command.id)))?;
    let rendered = serde_json::to_string_pretty(&trace)
        .map_err(|err| CliError::new(format!("failed to render trace: {err}")))?;
    writeln!(out, "{rendered}").map_err(|err| output_error(&err))
}

/// Runs one reconciliation.
fn command_poll(context: &CliContext, out: &mut dyn Write) -> CliResult<()> {
    let report = context
        .registry
        .poll_requests()
        .map_err(|err| CliError::new(format!("failed to poll requests: {err}")))?;
    write_json_line(out, &report)
}

/// Runs the periodic poller until it finishes its bounded rounds.
fn command_watch(
    config: &StmtDiagConfig,
    context: CliContext,
    command: &WatchCommand,
    out: &mut dyn Write,
) -> CliResult<()> {
    let poller_config = config.registry.poller_config(command.iterations);
    let handle = spawn_poller(context.registry, poller_config)
        .map_err(|err| CliError::new(format!("failed to start poller: {err}")))?;
    let rounds = handle.join().map_err(|err| CliError::new(format!("poller failed: {err}")))?;
    write_json_line(out, &json!({ "rounds": rounds }))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one compact JSON value followed by a newline.
fn write_json_line<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    writeln!(out, "{line}").map_err(|err| output_error(&err))
}

/// Formats an output write failure.
fn output_error(error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write to stdout: {error}"))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
