//! keyward - access key rotation and retirement runner
//!
//! Runs one lifecycle pass against a directory snapshot stored as JSON and
//! prints the pass report on stdout. Logs and notifications go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod commands;
mod config;
mod logging;
mod notifier;
mod state;

use logging::LogFormat;

/// keyward - access key lifecycle runner
#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "KEYWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "KEYWARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rotate the active access key of every identity
    Rotate {
        #[command(flatten)]
        pass: PassArgs,

        /// Merge issued secret documents into this file
        /// (defaults to `<state>.secrets.json` with --write-back)
        #[arg(long)]
        secrets_out: Option<PathBuf>,
    },

    /// Delete inactive access keys unused past the threshold
    Retire {
        #[command(flatten)]
        pass: PassArgs,

        /// Override the staleness threshold in days
        #[arg(long)]
        threshold_days: Option<u32>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Options shared by both passes.
#[derive(Args, Debug)]
struct PassArgs {
    /// Directory snapshot (JSON map of identity to keys)
    #[arg(short, long)]
    state: PathBuf,

    /// Persist the updated snapshot back to the state file
    #[arg(long)]
    write_back: bool,

    /// Reference time as RFC 3339 (defaults to now)
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose)?;

    let mut config = config::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current identity");
            interrupt.cancel();
        }
    });

    match cli.command {
        Command::Rotate { pass, secrets_out } => {
            commands::rotate(&config, &pass, secrets_out.as_deref(), cancel).await
        }
        Command::Retire {
            pass,
            threshold_days,
        } => {
            if let Some(days) = threshold_days {
                config = config.with_threshold_days(days);
            }
            commands::retire(&config, &pass, cancel).await
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
