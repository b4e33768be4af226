//! CLI entry point for eaactl, an Enterprise Application Access client.
//!
//! Resolves credentials from flags, environment and config file, then
//! dispatches to the selected command: event log retrieval (`log`) or one
//! of the listing commands (`idp list`, `connector list`).
//!
//! Exit codes:
//! - 0: success, or follow mode stopped between polls
//! - 1: runtime error (configuration, output, API error, etc.)
//! - 2: stopped right after an in-flight poll, or argument validation
//!   error (clap handles the latter automatically)
//! - 3: the API rejected the credentials (401/403)

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use eaactl::cancel::{CancellationController, install_signal_handlers};
use eaactl::client::EaaClient;
use eaactl::config::{CliConfig, ConfigBuilder};
use eaactl::connectors::{CONNECTOR_HEADER, format_connector, list_connectors};
use eaactl::error::EaaError;
use eaactl::eventlog::{EventLogPoller, LogType, PollConfig, RunSummary, StopReason};
use eaactl::idp::{IDP_HEADER, format_idp, list_idps};
use eaactl::output::OutputSink;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults to `<config dir>/eaactl/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ignore the config file entirely.
    #[arg(long, global = true, conflicts_with = "config")]
    no_config: bool,

    /// Tenant API host for signed requests (e.g. `akab-xxx.luna.akamaiapis.net`).
    #[arg(long, global = true)]
    host: Option<String>,

    /// API key id (client token).
    #[arg(long, global = true)]
    key_id: Option<String>,

    /// API secret. Prefer setting via the EAA_SECRET environment variable
    /// to avoid exposing the secret in process listings and shell history.
    #[arg(long, global = true, env = "EAA_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Access token for signed requests.
    #[arg(long, global = true)]
    access_token: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log debug details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve access or admin event logs.
    Log(LogArgs),

    /// Identity provider commands.
    Idp {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Connector commands.
    Connector {
        #[command(subcommand)]
        command: ListCommand,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum ListCommand {
    /// List every item as CSV.
    List,
}

#[derive(clap::Args)]
struct LogArgs {
    /// Which log to read.
    #[arg(long, value_enum, default_value_t = LogKind::Access)]
    log_type: LogKind,

    /// Keep polling until interrupted (Ctrl+C / SIGTERM).
    #[arg(short = 'f', long)]
    tail: bool,

    /// Start of the range, in seconds since the Unix epoch.
    #[arg(long)]
    start: Option<i64>,

    /// End of the range, in seconds since the Unix epoch. Range mode only.
    #[arg(long, conflicts_with = "tail")]
    end: Option<i64>,

    /// Write events to this file (truncated) instead of standard output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Field delimiter of output lines.
    #[arg(long)]
    delimiter: Option<String>,

    /// Seconds between two polls in tail mode.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Seconds the window end lags behind the current time.
    #[arg(long)]
    collection_delay: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogKind {
    Access,
    Admin,
}

impl From<LogKind> for LogType {
    fn from(kind: LogKind) -> Self {
        match kind {
            LogKind::Access => LogType::Access,
            LogKind::Admin => LogType::Admin,
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eaactl=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Standard output carries the events; diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Applies the CLI layer, then environment, then config file.
fn resolve_config(cli: &Cli) -> Result<CliConfig> {
    let mut builder = ConfigBuilder::new();

    if let Some(host) = &cli.host {
        builder = builder.with_host(host)?;
    }
    if let Some(key_id) = &cli.key_id {
        builder = builder.with_key_id(key_id);
    }
    if let Some(secret) = &cli.secret {
        builder = builder.with_secret(secret);
    }
    if let Some(token) = &cli.access_token {
        builder = builder.with_access_token(token);
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.with_timeout(timeout)?;
    }
    if let Commands::Log(args) = &cli.command {
        if let Some(delimiter) = &args.delimiter {
            builder = builder.with_delimiter(delimiter)?;
        }
        if let Some(interval) = args.poll_interval {
            builder = builder.with_poll_interval(interval)?;
        }
        if let Some(delay) = args.collection_delay {
            builder = builder.with_collection_delay(delay);
        }
    }

    builder = builder.with_env_overrides();
    if !cli.no_config {
        builder = builder
            .with_config_file(cli.config.as_deref())
            .context("failed to load config file")?;
    }
    Ok(builder.build()?)
}

fn poll_config(args: &LogArgs, config: &CliConfig) -> PollConfig {
    PollConfig {
        log_type: args.log_type.into(),
        start: args.start.map(|s| s.saturating_mul(1000)),
        end: args.end.map(|s| s.saturating_mul(1000)),
        follow: args.tail,
        poll_interval: config.poll_interval(),
        collection_delay: config.collection_delay(),
        ..PollConfig::default()
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create output file {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn utc(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

fn print_summary(summary: &RunSummary) {
    if let Some(window) = summary.last_window {
        eprintln!("# Start: {}", utc(window.start));
        eprintln!("# End: {}", utc(window.end));
    }
    eprintln!("# Total events: {}", summary.events_emitted);
    eprintln!("# Failed polls: {}", summary.failed_polls);
    eprintln!("# Bytes written: {}", summary.bytes_written);
}

async fn run_log(client: &EaaClient, args: &LogArgs, config: &CliConfig) -> Result<StopReason> {
    let cancel = CancellationController::new();
    install_signal_handlers(cancel.handle());

    let mut sink = OutputSink::new(open_output(args.output.as_ref())?, config.delimiter.clone());
    let mut poller = EventLogPoller::new(client, poll_config(args, config));
    let summary = poller.run(&mut sink, &cancel).await?;

    if !args.tail {
        print_summary(&summary);
    }
    Ok(summary.reason)
}

async fn run_list(client: &EaaClient, command: &Commands) -> Result<()> {
    let mut out = io::stdout().lock();
    let total = match command {
        Commands::Idp {
            command: ListCommand::List,
        } => {
            let idps = list_idps(client).await?;
            writeln!(out, "{IDP_HEADER}")?;
            for idp in &idps {
                writeln!(out, "{}", format_idp(idp))?;
            }
            eprintln!("# Total {} identity provider(s)", idps.len());
            idps.len()
        }
        Commands::Connector {
            command: ListCommand::List,
        } => {
            let connectors = list_connectors(client).await?;
            writeln!(out, "{CONNECTOR_HEADER}")?;
            for connector in &connectors {
                writeln!(out, "{}", format_connector(connector))?;
            }
            eprintln!("# Total {} connector(s)", connectors.len());
            connectors.len()
        }
        Commands::Log(_) => 0,
    };
    out.flush()?;
    debug!(total, "listing done");
    Ok(())
}

async fn run(cli: Cli) -> Result<StopReason> {
    let config = resolve_config(&cli)?;
    let client = EaaClient::new(config.credentials(), config.request_timeout())?;

    match &cli.command {
        Commands::Log(args) => run_log(&client, args, &config).await,
        other => {
            config.require_signing_settings()?;
            run_list(&client, other).await?;
            Ok(StopReason::Completed)
        }
    }
}

/// Maps the outcome of a run to the process exit code.
fn exit_code(outcome: &Result<StopReason>) -> ExitCode {
    match outcome {
        Ok(StopReason::Completed | StopReason::Interrupted) => ExitCode::SUCCESS,
        Ok(StopReason::InterruptedDuringPoll) => ExitCode::from(2),
        Err(e) if e.downcast_ref::<EaaError>().is_some_and(EaaError::is_auth_failure) => {
            ExitCode::from(3)
        }
        Err(_) => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = run(cli).await;
    if let Err(e) = &outcome {
        eprintln!("Error: {e:#}");
    }
    exit_code(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Base arguments that satisfy all mandatory fields.
    /// Tests append subcommands and flags to this baseline.
    fn base_args() -> Vec<&'static str> {
        vec!["eaactl", "--key-id", "kid-123", "--secret", "s3cret"]
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        let result = Cli::try_parse_from(base_args());
        assert!(result.is_err(), "a subcommand is required");
    }

    #[test]
    fn log_defaults_to_access_range_mode() {
        let mut args = base_args();
        args.push("log");
        let cli = Cli::try_parse_from(args).expect("should parse bare log command");
        let Commands::Log(log) = cli.command else {
            panic!("expected log command");
        };
        assert_eq!(log.log_type, LogKind::Access);
        assert!(!log.tail);
        assert!(log.start.is_none() && log.end.is_none());
    }

    #[test]
    fn tail_admin_log_parses() {
        let mut args = base_args();
        args.extend_from_slice(&["log", "--log-type", "admin", "--tail", "--delimiter", "|"]);
        let cli = Cli::try_parse_from(args).expect("should parse tail mode");
        let Commands::Log(log) = cli.command else {
            panic!("expected log command");
        };
        assert_eq!(log.log_type, LogKind::Admin);
        assert!(log.tail);
        assert_eq!(log.delimiter.as_deref(), Some("|"));
    }

    #[test]
    fn tail_and_end_conflict() {
        let mut args = base_args();
        args.extend_from_slice(&["log", "--tail", "--end", "1700000000"]);
        assert!(
            Cli::try_parse_from(args).is_err(),
            "an end bound makes no sense when following"
        );
    }

    #[test]
    fn unknown_log_type_is_rejected() {
        let mut args = base_args();
        args.extend_from_slice(&["log", "--log-type", "audit"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn range_bounds_are_converted_to_milliseconds() {
        let mut args = base_args();
        args.extend_from_slice(&["log", "--start", "1700000000", "--end", "1700000600"]);
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Log(log) = &cli.command else {
            panic!("expected log command");
        };
        let config = CliConfig::default();
        let poll = poll_config(log, &config);
        assert_eq!(poll.start, Some(1_700_000_000_000));
        assert_eq!(poll.end, Some(1_700_000_600_000));
        assert!(!poll.follow);
    }

    #[test]
    fn listing_commands_parse() {
        let mut args = base_args();
        args.extend_from_slice(&["idp", "list"]);
        assert!(matches!(
            Cli::try_parse_from(args).unwrap().command,
            Commands::Idp { .. }
        ));

        let mut args = base_args();
        args.extend_from_slice(&["connector", "list"]);
        assert!(matches!(
            Cli::try_parse_from(args).unwrap().command,
            Commands::Connector { .. }
        ));
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let args = vec!["eaactl", "log", "--no-config", "--key-id", "k", "-v"];
        let cli = Cli::try_parse_from(args).expect("global flags may follow the subcommand");
        assert!(cli.no_config);
        assert!(cli.verbose);
        assert_eq!(cli.key_id.as_deref(), Some("k"));
    }

    #[test]
    fn config_and_no_config_conflict() {
        let mut args = base_args();
        args.extend_from_slice(&["--config", "/tmp/x.toml", "--no-config", "log"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn exit_codes_follow_stop_reason_and_error_kind() {
        assert_eq!(exit_code(&Ok(StopReason::Completed)), ExitCode::SUCCESS);
        assert_eq!(exit_code(&Ok(StopReason::Interrupted)), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&Ok(StopReason::InterruptedDuringPoll)),
            ExitCode::from(2)
        );
        let auth = anyhow::Error::from(EaaError::Api {
            status: reqwest::StatusCode::FORBIDDEN,
            body: String::new(),
        });
        assert_eq!(exit_code(&Err(auth)), ExitCode::from(3));
        let other = anyhow::Error::from(EaaError::config("bad"));
        assert_eq!(exit_code(&Err(other)), ExitCode::FAILURE);
    }
}
