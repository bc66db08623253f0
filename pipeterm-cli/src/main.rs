//! Pipeterm CLI
//!
//! Command-line front end for defining, scheduling and running pipelines.
//! All state changes go through the engine; this binary only parses
//! arguments and prints results.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pipeterm")]
#[command(about = "Schedule, run and monitor data pipelines", long_about = None)]
struct Cli {
    /// Directory holding pipelines.json
    #[arg(long, env = "PIPETERM_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so tables on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeterm=info,pipeterm_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.storage_dir)?;

    handle_command(cli.command, config).await
}
