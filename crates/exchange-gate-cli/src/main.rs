// crates/exchange-gate-cli/src/main.rs
// ============================================================================
// Module: Exchange Gate CLI Entry Point
// Description: Command dispatcher for gate administration and local requests.
// Purpose: Manage policies, grants, and audits, and exercise the gate offline.
// Dependencies: clap, exchange-gate-config, exchange-gate-core, exchange-gate-service, tokio.
// ============================================================================

//! ## Overview
//! The Exchange Gate CLI administers field policies, allow-lists, and
//! consumer grants in the configured store, queries recorded audits, and
//! runs decision or full exchange requests against a local provider
//! fixture. Every request issued from the CLI is audited like any other.
//! Inputs are untrusted: files are read with hard size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use exchange_gate_config::ExchangeGateConfig;
use exchange_gate_config::StoreType;
use exchange_gate_config::config_toml_example;
use exchange_gate_core::AuditLogFilter;
use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::CallerMetadata;
use exchange_gate_core::ConsumerGrant;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::ExpectedVersion;
use exchange_gate_core::FieldName;
use exchange_gate_core::FieldPolicy;
use exchange_gate_core::FieldRegistration;
use exchange_gate_core::GrantDuration;
use exchange_gate_core::ProviderId;
use exchange_gate_core::Timestamp;
use exchange_gate_core::Versioned;
use exchange_gate_core::grant_allow_list;
use exchange_gate_core::prune_expired_entries;
use exchange_gate_core::register_provider_fields;
use exchange_gate_core::replace_consumer_grant;
use exchange_gate_core::revoke_allow_list_entry;
use exchange_gate_service::AccessRequest;
use exchange_gate_service::DecisionReport;
use exchange_gate_service::FixtureDownstream;
use exchange_gate_service::GateRuntime;
use exchange_gate_service::NoopMetrics;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of JSON input files (registrations, fixtures, payloads).
const MAX_INPUT_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "exchange-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Field policy administration.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Allow-list administration for restricted fields.
    AllowList {
        /// Selected allow-list subcommand.
        #[command(subcommand)]
        command: AllowListCommand,
    },
    /// Consumer grant administration.
    Grant {
        /// Selected grant subcommand.
        #[command(subcommand)]
        command: GrantCommand,
    },
    /// Evaluate a request without calling a provider.
    Evaluate(EvaluateCommand),
    /// Run a full exchange against a provider fixture.
    Request(RequestCommand),
    /// Audit log utilities.
    Audit {
        /// Selected audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigValidateCommand),
    /// Print an example configuration.
    Example,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Replace a provider's registered fields from a JSON file.
    Register(PolicyRegisterCommand),
    /// Show one field policy.
    Show(PolicyShowCommand),
    /// List field policies.
    List(PolicyListCommand),
}

/// Allow-list subcommands.
#[derive(Subcommand, Debug)]
enum AllowListCommand {
    /// Add or extend a consumer's entry on fields.
    Grant(AllowListGrantCommand),
    /// Remove a consumer's entry from a field.
    Revoke(AllowListRevokeCommand),
    /// Delete expired entries from a field.
    Prune(AllowListPruneCommand),
}

/// Grant subcommands.
#[derive(Subcommand, Debug)]
enum GrantCommand {
    /// Replace a consumer's approved fields.
    Set(GrantSetCommand),
    /// Show a consumer's approved fields.
    Show(GrantShowCommand),
}

/// Audit subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Query recorded audits, newest first.
    Query(AuditQueryCommand),
}

/// Store location inputs shared by store-backed commands.
#[derive(Args, Debug, Clone)]
struct StoreLocationArgs {
    /// Optional config file path (defaults to exchange-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Optional direct `SQLite` store path (overrides config).
    #[arg(long = "store-path", value_name = "PATH")]
    store_path: Option<PathBuf>,
}

/// Output formats for structured CLI commands.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Canonical JSON output.
    Json,
    /// Human-readable text output.
    Text,
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to exchange-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `policy register`.
#[derive(Args, Debug)]
struct PolicyRegisterCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Provider registering the fields.
    #[arg(long, value_name = "PROVIDER_ID")]
    provider: String,
    /// JSON array of field registrations.
    #[arg(long, value_name = "PATH")]
    fields: PathBuf,
}

/// Arguments for `policy show`.
#[derive(Args, Debug)]
struct PolicyShowCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Field name.
    #[arg(long, value_name = "FIELD")]
    field: String,
}

/// Arguments for `policy list`.
#[derive(Args, Debug)]
struct PolicyListCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Optional provider filter.
    #[arg(long, value_name = "PROVIDER_ID")]
    provider: Option<String>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

/// Arguments for `allow-list grant`.
#[derive(Args, Debug)]
struct AllowListGrantCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Consumer receiving the entry.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: String,
    /// Field to grant (repeatable).
    #[arg(long = "field", value_name = "FIELD", required = true)]
    fields: Vec<String>,
    /// Grant duration (`one_month`, `one_year`, or ISO-8601 like `P30D`).
    #[arg(long, value_name = "DURATION", default_value = "one_month")]
    duration: String,
}

/// Arguments for `allow-list revoke`.
#[derive(Args, Debug)]
struct AllowListRevokeCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Consumer losing the entry.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: String,
    /// Field to revoke from.
    #[arg(long, value_name = "FIELD")]
    field: String,
}

/// Arguments for `allow-list prune`.
#[derive(Args, Debug)]
struct AllowListPruneCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Field to prune.
    #[arg(long, value_name = "FIELD")]
    field: String,
}

/// Arguments for `grant set`.
#[derive(Args, Debug)]
struct GrantSetCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Consumer whose grant is replaced.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: String,
    /// Approved field (repeatable; none clears the grant).
    #[arg(long = "field", value_name = "FIELD")]
    fields: Vec<String>,
}

/// Arguments for `grant show`.
#[derive(Args, Debug)]
struct GrantShowCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Consumer to show.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: String,
}

/// Request identity shared by `evaluate` and `request`.
#[derive(Args, Debug, Clone)]
struct RequestArgs {
    /// Requesting consumer.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: String,
    /// Target provider.
    #[arg(long, value_name = "PROVIDER_ID")]
    provider: String,
    /// Requested field (repeatable).
    #[arg(long = "field", value_name = "FIELD", required = true)]
    fields: Vec<String>,
    /// Optional client trace identifier recorded with the audit.
    #[arg(long = "trace-id", value_name = "TRACE_ID")]
    trace_id: Option<String>,
}

/// Arguments for `evaluate`.
#[derive(Args, Debug)]
struct EvaluateCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Request identity.
    #[command(flatten)]
    request: RequestArgs,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

/// Arguments for `request`.
#[derive(Args, Debug)]
struct RequestCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Request identity.
    #[command(flatten)]
    request: RequestArgs,
    /// Provider fixture JSON (`{provider: {field: value}}`).
    #[arg(long, value_name = "PATH")]
    fixture: PathBuf,
    /// Optional request payload JSON.
    #[arg(long, value_name = "PATH")]
    payload: Option<PathBuf>,
}

/// Audit status filter values.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum StatusArg {
    /// Successful requests.
    Success,
    /// Failed requests.
    Failure,
}

/// Arguments for `audit query`.
#[derive(Args, Debug)]
struct AuditQueryCommand {
    /// Store location settings.
    #[command(flatten)]
    location: StoreLocationArgs,
    /// Consumer filter.
    #[arg(long, value_name = "CONSUMER_ID")]
    consumer: Option<String>,
    /// Provider filter.
    #[arg(long, value_name = "PROVIDER_ID")]
    provider: Option<String>,
    /// Status filter.
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    /// Inclusive lower time bound (RFC 3339).
    #[arg(long, value_name = "TIMESTAMP")]
    since: Option<String>,
    /// Exclusive upper time bound (RFC 3339).
    #[arg(long, value_name = "TIMESTAMP")]
    until: Option<String>,
    /// Maximum number of records.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
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

/// Errors raised while reading bounded input files.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// File could not be read.
    #[error("{0}")]
    Io(std::io::Error),
    /// File exceeded the size limit.
    #[error("file exceeds size limit ({size} > {limit} bytes)")]
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Allowed size in bytes.
        limit: usize,
    },
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
        write_stdout_line(&format!("exchange-gate {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Config {
            command,
        } => command_config(command),
        Commands::Policy {
            command,
        } => command_policy(command).await,
        Commands::AllowList {
            command,
        } => command_allow_list(command).await,
        Commands::Grant {
            command,
        } => command_grant(command).await,
        Commands::Evaluate(command) => command_evaluate(command).await,
        Commands::Request(command) => command_request(command).await,
        Commands::Audit {
            command,
        } => command_audit(command).await,
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(&command),
        ConfigCommand::Example => {
            write_stdout_line(config_toml_example().trim_end())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = ExchangeGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Loads configuration, applying the store path override.
fn resolve_config(location: &StoreLocationArgs) -> CliResult<ExchangeGateConfig> {
    let mut config = ExchangeGateConfig::load(location.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    apply_store_path_override(&mut config, location.store_path.as_deref());
    Ok(config)
}

/// Points the config at a `SQLite` store when `store_path` is given.
fn apply_store_path_override(config: &mut ExchangeGateConfig, store_path: Option<&Path>) {
    if let Some(path) = store_path {
        config.store.store_type = StoreType::Sqlite;
        config.store.path = Some(path.to_path_buf());
    }
}

/// Builds a gate runtime for the location.
fn open_runtime(location: &StoreLocationArgs) -> CliResult<GateRuntime> {
    let config = resolve_config(location)?;
    GateRuntime::from_config(&config, Arc::new(NoopMetrics))
        .map_err(|err| CliError::new(format!("failed to start gate: {err}")))
}

/// Builds a gate runtime for administration, which needs a durable store.
fn open_admin_runtime(location: &StoreLocationArgs) -> CliResult<GateRuntime> {
    let config = resolve_config(location)?;
    if config.store.store_type != StoreType::Sqlite {
        return Err(CliError::new(
            "administration requires a sqlite store (set store.type or --store-path)".to_string(),
        ));
    }
    GateRuntime::from_config(&config, Arc::new(NoopMetrics))
        .map_err(|err| CliError::new(format!("failed to start gate: {err}")))
}

/// Drains audits and returns `code`.
async fn finish(runtime: GateRuntime, code: ExitCode) -> CliResult<ExitCode> {
    runtime.shutdown().await;
    Ok(code)
}

// ============================================================================
// SECTION: Policy Commands
// ============================================================================

/// Dispatches policy subcommands.
async fn command_policy(command: PolicyCommand) -> CliResult<ExitCode> {
    match command {
        PolicyCommand::Register(command) => command_policy_register(&command).await,
        PolicyCommand::Show(command) => command_policy_show(&command).await,
        PolicyCommand::List(command) => command_policy_list(&command).await,
    }
}

/// Executes `policy register`.
async fn command_policy_register(command: &PolicyRegisterCommand) -> CliResult<ExitCode> {
    let fields: Vec<FieldRegistration> = read_json_file(&command.fields)?;
    let runtime = open_admin_runtime(&command.location)?;
    let provider = ProviderId::new(command.provider.clone());
    let summary =
        register_provider_fields(runtime.stores().policies.as_ref(), &provider, fields)
            .map_err(|err| CliError::new(format!("registration failed: {err}")))?;
    write_canonical_json(&summary)?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Executes `policy show`.
async fn command_policy_show(command: &PolicyShowCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let field = FieldName::new(command.field.clone());
    let policy = runtime
        .stores()
        .policies
        .load_field_policy(&field)
        .map_err(|err| CliError::new(format!("policy lookup failed: {err}")))?;
    let Some(policy) = policy else {
        return Err(CliError::new(format!("no policy for field {field}")));
    };
    write_canonical_json(&policy)?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Executes `policy list`.
async fn command_policy_list(command: &PolicyListCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let provider = command.provider.clone().map(ProviderId::new);
    let policies = runtime
        .stores()
        .policies
        .list_field_policies(provider.as_ref())
        .map_err(|err| CliError::new(format!("policy listing failed: {err}")))?;
    let text = render_policy_list_text(&policies);
    emit_structured_output(&policies, command.format, text)?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Renders a policy listing as text.
fn render_policy_list_text(policies: &[Versioned<FieldPolicy>]) -> String {
    if policies.is_empty() {
        return "no policies".to_string();
    }
    let mut output = String::new();
    for entry in policies {
        let policy = &entry.value;
        let _ = writeln!(
            output,
            "{} provider={} access={} entries={} consent={} version={}",
            policy.field_name,
            policy.provider,
            policy.access_control_type.as_str(),
            policy.allow_list.entries().len(),
            policy.consent_required,
            entry.version
        );
    }
    output
}

// ============================================================================
// SECTION: Allow-List Commands
// ============================================================================

/// Dispatches allow-list subcommands.
async fn command_allow_list(command: AllowListCommand) -> CliResult<ExitCode> {
    match command {
        AllowListCommand::Grant(command) => command_allow_list_grant(&command).await,
        AllowListCommand::Revoke(command) => command_allow_list_revoke(&command).await,
        AllowListCommand::Prune(command) => command_allow_list_prune(&command).await,
    }
}

/// Executes `allow-list grant`.
async fn command_allow_list_grant(command: &AllowListGrantCommand) -> CliResult<ExitCode> {
    let duration = GrantDuration::parse(&command.duration)
        .map_err(|err| CliError::new(format!("invalid duration: {err}")))?;
    let runtime = open_admin_runtime(&command.location)?;
    let fields: Vec<FieldName> =
        command.fields.iter().map(|field| FieldName::new(field.as_str())).collect();
    let grants = grant_allow_list(
        runtime.stores().policies.as_ref(),
        &fields,
        &ConsumerId::new(command.consumer.clone()),
        &duration,
        Timestamp::now_utc(),
    )
    .map_err(|err| CliError::new(format!("allow-list grant failed: {err}")))?;
    write_canonical_json(&grants)?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Result of an allow-list revoke.
#[derive(Debug, Serialize)]
struct RevokeOutput {
    /// Field revoked from.
    field_name: FieldName,
    /// Consumer revoked.
    consumer_id: ConsumerId,
    /// Whether an entry existed.
    removed: bool,
}

/// Executes `allow-list revoke`.
async fn command_allow_list_revoke(command: &AllowListRevokeCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let field_name = FieldName::new(command.field.clone());
    let consumer_id = ConsumerId::new(command.consumer.clone());
    let removed =
        revoke_allow_list_entry(runtime.stores().policies.as_ref(), &field_name, &consumer_id)
            .map_err(|err| CliError::new(format!("allow-list revoke failed: {err}")))?;
    write_canonical_json(&RevokeOutput {
        field_name,
        consumer_id,
        removed,
    })?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Result of an allow-list prune.
#[derive(Debug, Serialize)]
struct PruneOutput {
    /// Field pruned.
    field_name: FieldName,
    /// Entries deleted.
    pruned: usize,
}

/// Executes `allow-list prune`.
async fn command_allow_list_prune(command: &AllowListPruneCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let field_name = FieldName::new(command.field.clone());
    let pruned = prune_expired_entries(
        runtime.stores().policies.as_ref(),
        &field_name,
        Timestamp::now_utc(),
    )
    .map_err(|err| CliError::new(format!("allow-list prune failed: {err}")))?;
    write_canonical_json(&PruneOutput {
        field_name,
        pruned,
    })?;
    finish(runtime, ExitCode::SUCCESS).await
}

// ============================================================================
// SECTION: Grant Commands
// ============================================================================

/// Dispatches grant subcommands.
async fn command_grant(command: GrantCommand) -> CliResult<ExitCode> {
    match command {
        GrantCommand::Set(command) => command_grant_set(&command).await,
        GrantCommand::Show(command) => command_grant_show(&command).await,
    }
}

/// Executes `grant set`.
async fn command_grant_set(command: &GrantSetCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let grant = ConsumerGrant::new(command.consumer.clone(), command.fields.iter().cloned());
    let version =
        replace_consumer_grant(runtime.stores().grants.as_ref(), grant.clone(), ExpectedVersion::Any)
            .map_err(|err| CliError::new(format!("grant update failed: {err}")))?;
    write_canonical_json(&Versioned::new(version, grant))?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Executes `grant show`.
async fn command_grant_show(command: &GrantShowCommand) -> CliResult<ExitCode> {
    let runtime = open_admin_runtime(&command.location)?;
    let consumer_id = ConsumerId::new(command.consumer.clone());
    let grant = runtime
        .stores()
        .grants
        .load_consumer_grant(&consumer_id)
        .map_err(|err| CliError::new(format!("grant lookup failed: {err}")))?;
    let Some(grant) = grant else {
        return Err(CliError::new(format!("no grant for consumer {consumer_id}")));
    };
    write_canonical_json(&grant)?;
    finish(runtime, ExitCode::SUCCESS).await
}

// ============================================================================
// SECTION: Request Commands
// ============================================================================

/// Builds an access request from CLI arguments.
fn build_request(args: &RequestArgs) -> AccessRequest {
    AccessRequest::new(args.consumer.clone(), args.provider.clone(), args.fields.iter().cloned())
        .with_caller(CallerMetadata {
            user_agent: Some(format!("exchange-gate-cli/{}", env!("CARGO_PKG_VERSION"))),
            remote_addr: None,
            client_trace_id: args.trace_id.clone(),
        })
}

/// Executes `evaluate`.
async fn command_evaluate(command: EvaluateCommand) -> CliResult<ExitCode> {
    let runtime = open_runtime(&command.location)?;
    let request = build_request(&command.request);
    let report = match runtime.gate().decide(&request) {
        Ok(report) => report,
        Err(err) => {
            runtime.shutdown().await;
            return Err(CliError::new(format!("evaluation failed: {err}")));
        }
    };
    let text = render_decision_text(&report);
    emit_structured_output(&report, command.format, text)?;
    let code = if report.is_denied() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    finish(runtime, code).await
}

/// Executes `request`.
async fn command_request(command: RequestCommand) -> CliResult<ExitCode> {
    let fixture: Value = read_json_file(&command.fixture)?;
    let downstream = FixtureDownstream::from_json(fixture)
        .map_err(|err| CliError::new(format!("invalid fixture: {err}")))?;
    let mut request = build_request(&command.request);
    if let Some(path) = &command.payload {
        request = request.with_payload(read_json_file(path)?);
    }
    let runtime = open_runtime(&command.location)?;
    let outcome = match runtime.gate().exchange(&request, &downstream).await {
        Ok(outcome) => outcome,
        Err(err) => {
            runtime.shutdown().await;
            return Err(CliError::new(format!("request failed: {err}")));
        }
    };
    write_canonical_json(&outcome)?;
    let code = if outcome.report.is_denied() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    finish(runtime, code).await
}

/// Renders a decision report as text.
fn render_decision_text(report: &DecisionReport) -> String {
    let mut output = String::new();
    let verdict = if report.is_denied() { "denied" } else { "allowed" };
    let _ = writeln!(output, "request {} {verdict}", report.correlation_id);
    for decision in &report.decisions {
        let _ = writeln!(
            output,
            "  {} {}{}",
            decision.field_name,
            decision.outcome.reason_code(),
            if decision.consent_required { " (consent required)" } else { "" }
        );
    }
    output
}

// ============================================================================
// SECTION: Audit Commands
// ============================================================================

/// Dispatches audit subcommands.
async fn command_audit(command: AuditCommand) -> CliResult<ExitCode> {
    match command {
        AuditCommand::Query(command) => command_audit_query(&command).await,
    }
}

/// Builds an audit filter from CLI arguments.
fn build_audit_filter(command: &AuditQueryCommand) -> CliResult<AuditLogFilter> {
    let parse = |label: &str, value: Option<&String>| {
        value
            .map(|value| {
                Timestamp::parse_rfc3339(value)
                    .map_err(|err| CliError::new(format!("invalid --{label}: {err}")))
            })
            .transpose()
    };
    Ok(AuditLogFilter {
        consumer_id: command.consumer.clone().map(ConsumerId::new),
        provider_id: command.provider.clone().map(ProviderId::new),
        status: command.status.map(|status| match status {
            StatusArg::Success => AuditStatus::Success,
            StatusArg::Failure => AuditStatus::Failure,
        }),
        since: parse("since", command.since.as_ref())?,
        until: parse("until", command.until.as_ref())?,
        limit: command.limit,
    })
}

/// Executes `audit query`.
async fn command_audit_query(command: &AuditQueryCommand) -> CliResult<ExitCode> {
    let filter = build_audit_filter(command)?;
    let runtime = open_runtime(&command.location)?;
    let Some(audit_log) = runtime.audit_log() else {
        runtime.shutdown().await;
        return Err(CliError::new(
            "configured audit sink does not support queries (use the sqlite sink)".to_string(),
        ));
    };
    let records = audit_log
        .query_audit_logs(&filter)
        .map_err(|err| CliError::new(format!("audit query failed: {err}")))?;
    let text = render_audit_text(&records);
    emit_structured_output(&records, command.format, text)?;
    finish(runtime, ExitCode::SUCCESS).await
}

/// Renders audit records as text.
fn render_audit_text(records: &[AuditLogRecord]) -> String {
    if records.is_empty() {
        return "no audit records".to_string();
    }
    let mut output = String::new();
    for record in records {
        let consumer = record.consumer_id.as_ref().map_or("-", |id| id.as_str());
        let provider = record.provider_id.as_ref().map_or("-", |id| id.as_str());
        let reason = record.failure_reason.map_or("", |reason| reason.as_str());
        let _ = writeln!(
            output,
            "{} {} {} {consumer} {provider} {reason}",
            record.timestamp,
            record.correlation_id,
            record.status.as_str()
        );
    }
    output
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads and parses a bounded JSON input file.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid json in {}: {err}", path.display())))
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let metadata = file.metadata().map_err(ReadLimitError::Io)?;
    let size = metadata.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes raw bytes to stdout without adding a newline.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Computes canonical JSON bytes for output rendering.
fn canonical_output_bytes<T: Serialize>(value: &T) -> CliResult<Vec<u8>> {
    serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))
}

/// Writes canonical JSON to stdout with a trailing newline.
fn write_canonical_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = canonical_output_bytes(value)?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Emits structured output in the selected format.
fn emit_structured_output<T: Serialize>(
    value: &T,
    format: OutputFormat,
    text: String,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_canonical_json(value),
        OutputFormat::Text => {
            let mut output = text;
            if !output.ends_with('\n') {
                output.push('\n');
            }
            write_stdout_bytes(output.as_bytes())
                .map_err(|err| CliError::new(output_error("stdout", &err)))
        }
    }
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
