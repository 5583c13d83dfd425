//! Argument parsing, logging setup and command dispatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use envcopy_config::{RequestInput, load_settings};
use envcopy_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};

use crate::commands::derive::{DeriveInput, handle_derive_name};
use crate::commands::refresh::handle_refresh;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;

/// Parses CLI arguments, installs logging, and executes the requested
/// command. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(exit_code) => exit_code,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<i32> {
    let format = cli.log_format.map_or_else(LogFormat::infer, LogFormat::from);
    init_logging(&LoggingConfig {
        level: &cli.log_level,
        format,
        log_file: cli.log_file.as_deref(),
    })
    .context("failed to initialise logging")
    .map_err(CliError::failure)?;

    let settings = load_settings(cli.config.as_deref())?;
    match cli.command {
        Command::Refresh(args) => handle_refresh(args.into_input(), settings, cli.output).await,
        Command::DeriveName(args) => {
            handle_derive_name(args.into_input(), &settings, cli.output)?;
            Ok(0)
        }
    }
}

#[derive(Parser)]
#[command(
    name = "envcopy",
    version,
    about = "Refresh a namespace of an environment with the data of another namespace"
)]
struct Cli {
    #[arg(long, global = true, env = "ENVCOPY_CONFIG", help = "YAML settings file")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "ENVCOPY_LOG_FILE",
        help = "Append log records to this file"
    )]
    log_file: Option<PathBuf>,
    #[arg(long, global = true, env = "ENVCOPY_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(long, global = true, env = "ENVCOPY_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormatArg>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select the report format"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy databases, containers and configuration between namespaces.
    Refresh(RefreshArgs),
    /// Show the destination name derived for one source name.
    DeriveName(DeriveNameArgs),
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
        }
    }
}

#[derive(Args)]
struct RefreshArgs {
    #[arg(long, env = "ENVCOPY_SOURCE")]
    source: String,
    #[arg(long, env = "ENVCOPY_DESTINATION")]
    destination: String,
    #[arg(long, env = "ENVCOPY_SOURCE_NAMESPACE")]
    source_namespace: String,
    #[arg(long, env = "ENVCOPY_DESTINATION_NAMESPACE")]
    destination_namespace: String,
    #[arg(
        long,
        env = "ENVCOPY_DRY_RUN",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        help = "Only report what would happen; pass --dry-run false to execute"
    )]
    dry_run: bool,
    #[arg(long, env = "ENVCOPY_MAX_WAIT_MINUTES")]
    max_wait_minutes: Option<u64>,
    #[arg(
        long,
        env = "ENVCOPY_RESTORE_DATE_TIME",
        help = "Restore point, RFC 3339 or 'YYYY-MM-DD HH:MM[:SS]'"
    )]
    restore_date_time: Option<String>,
    #[arg(
        long,
        env = "ENVCOPY_TIMEZONE",
        help = "Zone of a naive restore point: UTC, local (default) or an offset such as +02:00"
    )]
    timezone: Option<String>,
    #[arg(long, env = "ENVCOPY_INSTANCE_ALIAS")]
    instance_alias: Option<String>,
    #[arg(long, env = "ENVCOPY_INSTANCE_ALIAS_TO_REMOVE")]
    instance_alias_to_remove: Option<String>,
}

impl RefreshArgs {
    fn into_input(self) -> RequestInput {
        RequestInput {
            source: self.source,
            destination: self.destination,
            source_namespace: self.source_namespace,
            destination_namespace: self.destination_namespace,
            dry_run: self.dry_run,
            max_wait_minutes: self.max_wait_minutes,
            restore_date_time: self.restore_date_time,
            timezone: self.timezone,
            instance_alias: self.instance_alias,
            instance_alias_to_remove: self.instance_alias_to_remove,
        }
    }
}

#[derive(Args)]
struct DeriveNameArgs {
    #[arg(help = "Source object name")]
    source_name: String,
    #[arg(long)]
    product: String,
    #[arg(long, help = "Service token; inferred from the name when omitted")]
    service: Option<String>,
    #[arg(long)]
    source_namespace: String,
    #[arg(long)]
    destination_namespace: String,
    #[arg(long)]
    environment: String,
    #[arg(long, help = "Defaults to --environment")]
    destination_environment: Option<String>,
    #[arg(long)]
    region: String,
    #[arg(long, help = "Defaults to --region")]
    destination_region: Option<String>,
    #[arg(long)]
    tier: String,
    #[arg(long, help = "Defaults to --tier")]
    destination_tier: Option<String>,
}

impl DeriveNameArgs {
    fn into_input(self) -> DeriveInput {
        DeriveInput {
            source_name: self.source_name,
            product: self.product,
            service: self.service,
            source_namespace: self.source_namespace,
            destination_namespace: self.destination_namespace,
            source_environment: self.environment,
            destination_environment: self.destination_environment,
            source_region: self.region,
            destination_region: self.destination_region,
            source_tier: self.tier,
            destination_tier: self.destination_tier,
        }
    }
}
