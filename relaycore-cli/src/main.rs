#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// relaycore-cli/src/main.rs
// ============================================================================
// Module: RelayCore CLI Entry Point
// Description: Command dispatcher for the Submission API server and client.
// Purpose: Provide a safe, localized CLI to run and drive a RelayCore node.
// Dependencies: clap, relaycore-server, relaycore-contract, reqwest, tokio.
// ============================================================================

//! ## Overview
//! The RelayCore CLI has two faces: `serve` boots a Submission API server
//! in-process, and the remaining subcommands are a thin HTTP client against
//! any running Submission API (local or remote). All user-facing strings
//! are routed through the i18n catalog. Security posture: inputs are
//! untrusted and must be validated; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use relaycore_budget::BudgetController;
use relaycore_budget::InMemoryBudgetController;
use relaycore_budget::InMemoryTenantRegistry;
use relaycore_cli::t;
use relaycore_contract::ManualDecision;
use relaycore_contract::ManualDecisionRequest;
use relaycore_contract::OperatorInputRequest;
use relaycore_contract::SubmitRunRequest;
use relaycore_core::RunId;
use relaycore_core::RunStateStore;
use relaycore_core::TaskPriority;
use relaycore_core::TenantId;
use relaycore_engine::InMemoryStateManager;
use relaycore_server::AppState;
use relaycore_server::FileArtifactStore;
use relaycore_server::RelayCoreServerConfig;
use relaycore_server::RunStateStoreType;
use relaycore_server::auth::AuthAuditSink;
use relaycore_server::auth::DefaultRequestAuthorizer;
use relaycore_server::auth::NoopAuditSink;
use relaycore_server::auth::StderrAuditSink;
use relaycore_server::audit::FileRequestAuditSink;
use relaycore_server::audit::NoopRequestAuditSink;
use relaycore_server::audit::RequestAuditSink;
use relaycore_server::audit::StderrRequestAuditSink;
use relaycore_store_sqlite::SqliteRunStateStore;
use relaycore_store_sqlite::SqliteStoreConfig;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api_client::ApiClientConfig;
use crate::api_client::SubmissionApiClient;
use crate::serve_policy::ServePolicyError;

mod api_client;
mod serve_policy;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "relaycore",
    disable_help_subcommand = true,
    disable_version_flag = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Submission API server.
    Serve(ServeCommand),
    /// Submit a new run.
    Submit(SubmitCommand),
    /// Fetch a run's current state.
    Status(StatusCommand),
    /// Artifact inspection utilities.
    Artifacts {
        /// Selected artifacts subcommand.
        #[command(subcommand)]
        command: ArtifactsCommand,
    },
    /// Submit operator input to resume a paused run.
    OperatorInput(OperatorInputCommand),
    /// Submit a manual governance decision for a paused run.
    Decision(DecisionCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to relaycore-server.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Opt in to binding a non-loopback address.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_non_loopback: bool,
}

/// Shared connection flags for client subcommands.
#[derive(Args, Debug)]
struct ClientArgs {
    /// Submission API base URL.
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8080")]
    url: String,
    /// Bearer token for authenticated requests.
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    timeout_secs: u64,
}

/// Arguments for `submit`.
#[derive(Args, Debug)]
struct SubmitCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Owning tenant id.
    #[arg(long, value_name = "TENANT_ID")]
    tenant: String,
    /// Path to the run spec JSON file.
    #[arg(long, value_name = "PATH")]
    spec: PathBuf,
    /// Optional execution priority.
    #[arg(long, value_enum)]
    priority: Option<CliTaskPriority>,
}

/// Arguments for `status`.
#[derive(Args, Debug)]
struct StatusCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Run id to fetch.
    #[arg(long, value_name = "RUN_ID")]
    run: String,
}

/// Artifact subcommands.
#[derive(Subcommand, Debug)]
enum ArtifactsCommand {
    /// List artifact paths recorded against a run.
    List(ArtifactsListCommand),
    /// Fetch a single artifact's bytes.
    Fetch(ArtifactsFetchCommand),
}

/// Arguments for `artifacts list`.
#[derive(Args, Debug)]
struct ArtifactsListCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Run id to list artifacts for.
    #[arg(long, value_name = "RUN_ID")]
    run: String,
}

/// Arguments for `artifacts fetch`.
#[derive(Args, Debug)]
struct ArtifactsFetchCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Run id owning the artifact.
    #[arg(long, value_name = "RUN_ID")]
    run: String,
    /// Artifact path within the run.
    #[arg(long, value_name = "PATH")]
    path: String,
    /// Output file path (defaults to stdout).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// Arguments for `operator-input`.
#[derive(Args, Debug)]
struct OperatorInputCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Paused run id to resume.
    #[arg(long, value_name = "RUN_ID")]
    run: String,
    /// Path to a JSON patch file merged into the run's spec.
    #[arg(long, value_name = "PATH")]
    patch: PathBuf,
}

/// Arguments for `decision`.
#[derive(Args, Debug)]
struct DecisionCommand {
    #[command(flatten)]
    client: ClientArgs,
    /// Paused run id to resolve.
    #[arg(long, value_name = "RUN_ID")]
    run: String,
    /// Operator-selected posture.
    #[arg(long, value_enum)]
    decision: CliManualDecision,
}

/// Clap-facing mirror of [`relaycore_core::TaskPriority`].
#[derive(ValueEnum, Copy, Clone, Debug)]
enum CliTaskPriority {
    /// Highest priority.
    Critical,
    /// High priority.
    High,
    /// Normal priority.
    Normal,
    /// Low priority.
    Low,
    /// Batch priority.
    Batch,
}

impl From<CliTaskPriority> for TaskPriority {
    fn from(value: CliTaskPriority) -> Self {
        match value {
            CliTaskPriority::Critical => Self::Critical,
            CliTaskPriority::High => Self::High,
            CliTaskPriority::Normal => Self::Normal,
            CliTaskPriority::Low => Self::Low,
            CliTaskPriority::Batch => Self::Batch,
        }
    }
}

/// Clap-facing mirror of [`relaycore_contract::ManualDecision`].
#[derive(ValueEnum, Copy, Clone, Debug)]
enum CliManualDecision {
    /// Resume with the minimal plan.
    ContinueMinimal,
    /// Resume with the degraded plan.
    ContinueDegraded,
    /// Abandon the run.
    Stop,
}

impl From<CliManualDecision> for ManualDecision {
    fn from(value: CliManualDecision) -> Self {
        match value {
            CliManualDecision::ContinueMinimal => Self::ContinueMinimal,
            CliManualDecision::ContinueDegraded => Self::ContinueDegraded,
            CliManualDecision::Stop => Self::Stop,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a localized message.
    const fn new(message: String) -> Self {
        Self { message }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Bounded file read failure.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// Underlying I/O failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// File exceeded the configured size limit.
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Observed file size in bytes.
        size: u64,
        /// Configured size limit in bytes.
        limit: usize,
    },
}

/// Maximum size for any file the CLI reads on behalf of the user.
const MAX_INPUT_FILE_BYTES: usize = 16 * 1024 * 1024;

/// Reads a file's bytes, failing closed if it exceeds `limit`.
fn read_bytes_with_limit(path: &Path, limit: usize) -> Result<Vec<u8>, ReadLimitError> {
    let metadata = fs::metadata(path)?;
    let size = metadata.len();
    if size > limit as u64 {
        return Err(ReadLimitError::TooLarge { size, limit });
    }
    Ok(fs::read(path)?)
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Submit(command) => command_submit(command).await,
        Commands::Status(command) => command_status(command).await,
        Commands::Artifacts { command } => command_artifacts(command).await,
        Commands::OperatorInput(command) => command_operator_input(command).await,
        Commands::Decision(command) => command_decision(command).await,
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = RelayCoreServerConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("serve.config.load_failed", error = err)))?;
    let allow_non_loopback = serve_policy::resolve_allow_non_loopback(command.allow_non_loopback)
        .map_err(|err: ServePolicyError| CliError::new(err.to_string()))?;
    let outcome = serve_policy::enforce_local_only(&config, allow_non_loopback)
        .map_err(|err| CliError::new(err.to_string()))?;
    write_stderr_line(&t!("serve.warn.local_only"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    if outcome.network_exposed {
        warn_network_exposure(&outcome)?;
    }

    let state = build_app_state(&config)
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    relaycore_server::serve(state, outcome.bind_addr)
        .await
        .map_err(|err| CliError::new(t!("serve.failed", error = err)))?;

    Ok(ExitCode::SUCCESS)
}

/// Emits the security warning banner for non-loopback exposure.
fn warn_network_exposure(outcome: &serve_policy::BindOutcome) -> CliResult<()> {
    let lines = [
        t!("serve.warn.network.header"),
        t!("serve.warn.network.bind", bind = outcome.bind_addr),
        t!("serve.warn.network.auth", mode = format!("{:?}", outcome.auth_mode)),
        t!(
            "serve.warn.network.tls",
            tls = if outcome.tls.is_some() { t!("serve.warn.network.enabled") } else { t!("serve.warn.network.disabled") }
        ),
        t!(
            "serve.warn.network.audit",
            status = if outcome.audit_enabled { t!("serve.warn.network.enabled") } else { t!("serve.warn.network.disabled") }
        ),
        t!(
            "serve.warn.network.rate_limit",
            status = if outcome.rate_limit_enabled { t!("serve.warn.network.enabled") } else { t!("serve.warn.network.disabled") }
        ),
        t!("serve.warn.network.footer"),
    ];
    for line in lines {
        write_stderr_line(&line).map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    Ok(())
}

/// Builds the Submission API application state from loaded configuration.
///
/// Tenants are not bootstrapped from configuration; register them against
/// the budget controller's [`relaycore_budget::TenantRegistry`] out of band
/// before submitting runs.
fn build_app_state(config: &RelayCoreServerConfig) -> Result<AppState, String> {
    let run_state: Arc<dyn RunStateStore> = match config.run_state_store.store_type {
        RunStateStoreType::Memory => Arc::new(InMemoryStateManager::new()),
        RunStateStoreType::Sqlite => {
            let path = config
                .run_state_store
                .path
                .clone()
                .ok_or_else(|| "sqlite run_state_store requires a path".to_string())?;
            let sqlite_config = SqliteStoreConfig {
                path,
                busy_timeout_ms: config.run_state_store.busy_timeout_ms,
                journal_mode: config.run_state_store.journal_mode,
                sync_mode: config.run_state_store.sync_mode,
            };
            Arc::new(SqliteRunStateStore::new(sqlite_config).map_err(|err| err.to_string())?)
        }
    };

    let registry = Arc::new(InMemoryTenantRegistry::new());
    let budget: Arc<dyn BudgetController> = Arc::new(InMemoryBudgetController::new(registry));
    let artifacts = Arc::new(
        FileArtifactStore::new(config.artifact_root.clone()).map_err(|err| err.to_string())?,
    );
    let authz = Arc::new(DefaultRequestAuthorizer::from_config(config.server.auth.as_ref()));
    let auth_audit: Arc<dyn AuthAuditSink> =
        if config.server.audit.enabled { Arc::new(StderrAuditSink) } else { Arc::new(NoopAuditSink) };
    let request_audit: Arc<dyn RequestAuditSink> = build_request_audit_sink(config)?;
    let rate_limit = config.server.limits.rate_limit.clone().unwrap_or_default();

    Ok(AppState::new(run_state, budget, artifacts, authz, auth_audit, request_audit, rate_limit))
}

/// Selects the audit sink implied by configuration.
fn build_request_audit_sink(
    config: &RelayCoreServerConfig,
) -> Result<Arc<dyn RequestAuditSink>, String> {
    if !config.server.audit.enabled {
        return Ok(Arc::new(NoopRequestAuditSink));
    }
    match &config.server.audit.path {
        Some(path) => {
            let sink = FileRequestAuditSink::open(Path::new(path)).map_err(|err| err.to_string())?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrRequestAuditSink)),
    }
}

// ============================================================================
// SECTION: Client Commands
// ============================================================================

/// Builds an API client from shared connection flags.
fn build_client(args: &ClientArgs) -> CliResult<SubmissionApiClient> {
    let config = ApiClientConfig {
        base_url: args.url.trim_end_matches('/').to_string(),
        bearer_token: args.token.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };
    SubmissionApiClient::new(config).map_err(|err| CliError::new(t!("client.init_failed", error = err)))
}

/// Executes the `submit` command.
async fn command_submit(command: SubmitCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let spec = read_export_json(&command.spec, &t!("submit.kind.spec"))?;
    let request = SubmitRunRequest {
        tenant_id: TenantId::new(command.tenant),
        spec,
        priority: command.priority.map(TaskPriority::from),
    };
    let response = client
        .submit_run(&request)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    print_json(&response)
}

/// Executes the `status` command.
async fn command_status(command: StatusCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let response = client
        .fetch_run_state(&command.run)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    print_json(&response)
}

/// Dispatches artifact subcommands.
async fn command_artifacts(command: ArtifactsCommand) -> CliResult<ExitCode> {
    match command {
        ArtifactsCommand::List(command) => command_artifacts_list(command).await,
        ArtifactsCommand::Fetch(command) => command_artifacts_fetch(command).await,
    }
}

/// Executes the `artifacts list` command.
async fn command_artifacts_list(command: ArtifactsListCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let paths = client
        .list_artifacts(&command.run)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    print_json(&paths)
}

/// Executes the `artifacts fetch` command.
async fn command_artifacts_fetch(command: ArtifactsFetchCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let bytes = client
        .fetch_artifact(&command.run, &command.path)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    match command.output {
        Some(path) => {
            fs::write(&path, &bytes).map_err(|err| {
                CliError::new(t!("artifacts.fetch.write_failed", path = path.display(), error = err))
            })?;
            write_stdout_line(&t!("artifacts.fetch.ok", path = path.display()))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        None => {
            std::io::stdout()
                .write_all(&bytes)
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `operator-input` command.
async fn command_operator_input(command: OperatorInputCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let patch = read_export_json(&command.patch, &t!("operator_input.kind.patch"))?;
    let request = OperatorInputRequest { run_id: RunId::new(command.run), patch };
    let response = client
        .submit_operator_input(&request)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    print_json(&response)
}

/// Executes the `decision` command.
async fn command_decision(command: DecisionCommand) -> CliResult<ExitCode> {
    let client = build_client(&command.client)?;
    let request = ManualDecisionRequest {
        run_id: RunId::new(command.run),
        decision: ManualDecision::from(command.decision),
    };
    let response = client
        .submit_manual_decision(&request)
        .await
        .map_err(|err| CliError::new(t!("client.request_failed", error = err)))?;
    print_json(&response)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads and parses a JSON input file for client subcommands.
fn read_export_json<T: DeserializeOwned>(path: &Path, kind: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_FILE_BYTES).map_err(|err| {
        CliError::new(t!(
            "submit.read_failed",
            kind = kind,
            path = path.display(),
            error = err
        ))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(t!(
            "submit.parse_failed",
            kind = kind,
            path = path.display(),
            error = err
        ))
    })
}

/// Prints a value as canonical JSON to stdout.
fn print_json<T: serde::Serialize>(value: &T) -> CliResult<ExitCode> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(t!("client.encode_failed", error = err)))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats a localized output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}

// ============================================================================
// SECTION: Tests
// ============================================================================
