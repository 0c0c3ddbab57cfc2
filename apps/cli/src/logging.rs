//! Tracing subscriber setup. Everything is written to stderr.

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the verbosity flags.
const LOG_ENV: &str = "KEYWARD_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,keyward=info,keyward_lifecycle=info",
        1 => "info,keyward_lifecycle=debug",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init(format: LogFormat, verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => builder.with_target(true).try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
