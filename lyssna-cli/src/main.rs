//! ## lyssna-cli
//! **Command line entrypoint**
//!
//! `run` captures and routes traffic until interrupted; `decode`, `actions`
//! and `probe` are one-shot diagnostics. Results go to stdout, logs to stderr.

use anyhow::anyhow;
use clap::Parser;
use lyssna_telemetry::EventLogger;

mod commands;

use commands::{load_config, run_command, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    EventLogger::init(&config.telemetry.log_level).map_err(|e| anyhow!(e))?;

    run_command(cli.command, config).await
}
