//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cron;
mod pipeline;
mod watch;

use anyhow::{Context, Result};
use clap::Subcommand;
use pipeterm_core::domain::pipeline::PipelineCollection;
use pipeterm_engine::{EngineConfig, FileStore, PipelineEngine, PipelineStore};
use std::path::PathBuf;

/// Top-level CLI commands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Create a new pipeline
    Add {
        /// Pipeline name
        name: String,

        /// Run this script through the custom runner instead of the
        /// built-in ingestion script
        #[arg(short, long)]
        script: Option<PathBuf>,
    },
    /// List all pipelines
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Get pipeline details
    Show {
        /// Pipeline ID
        id: u64,
    },
    /// Print a pipeline's full log
    Logs {
        /// Pipeline ID
        id: u64,
    },
    /// Run a pipeline now and wait for it to finish
    Run {
        /// Pipeline ID
        id: u64,
    },
    /// Delete a pipeline
    Delete {
        /// Pipeline ID
        id: u64,
    },
    /// Schedule a pipeline with a cron expression
    Schedule {
        /// Pipeline ID
        id: u64,

        /// Cron expression, e.g. "*/5 * * * *" (quoting is optional)
        #[arg(required = true, num_args = 1..)]
        cron: Vec<String>,
    },
    /// Remove a pipeline's schedule
    Unschedule {
        /// Pipeline ID
        id: u64,
    },
    /// Preview the next fire times of a cron expression
    Next {
        /// Cron expression
        cron: String,

        /// How many fire times to show
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
    /// Keep schedules and health checks running, redrawing the table
    Watch {
        /// Redraw interval in milliseconds
        #[arg(long, default_value = "500")]
        refresh_ms: u64,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module. `next` never
/// touches storage. `list`, `show` and `logs` only read the saved file and
/// work while another process owns the storage. Everything else opens the
/// engine, which takes the storage lock.
pub async fn handle_command(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Next { cron, count } => cron::preview(&cron, count),
        Commands::List { json } => pipeline::list(&read_snapshot(&config)?, json),
        Commands::Show { id } => pipeline::show(&read_snapshot(&config)?, id),
        Commands::Logs { id } => pipeline::logs(&read_snapshot(&config)?, id),
        command => {
            let engine = open_engine(config)?;
            match command {
                Commands::Add { name, script } => pipeline::add(&engine, name, script),
                Commands::Run { id } => pipeline::run(&engine, id).await,
                Commands::Delete { id } => pipeline::delete(&engine, id),
                Commands::Schedule { id, cron } => {
                    pipeline::schedule(&engine, id, &cron.join(" "))
                }
                Commands::Unschedule { id } => pipeline::unschedule(&engine, id),
                Commands::Watch { refresh_ms } => watch::watch(&engine, refresh_ms).await,
                // Read-only commands are handled above
                Commands::Next { .. }
                | Commands::List { .. }
                | Commands::Show { .. }
                | Commands::Logs { .. } => Ok(()),
            }
        }
    }
}

/// Last saved collection, as is: nothing is reconciled or written back
fn read_snapshot(config: &EngineConfig) -> Result<PipelineCollection> {
    FileStore::new(config.storage_dir.clone())
        .load()
        .with_context(|| {
            format!(
                "Failed to read pipeline storage in {}",
                config.storage_dir.display()
            )
        })
}

fn open_engine(config: EngineConfig) -> Result<PipelineEngine> {
    let storage = config.storage_dir.display().to_string();
    PipelineEngine::with_defaults(config).map_err(|e| {
        let message = if e.is_locked() {
            format!(
                "Pipeline storage in {} is owned by another pipeterm process \
                 (is `pipeterm watch` running?); stop it to make changes",
                storage
            )
        } else {
            format!("Failed to open pipeline storage in {}", storage)
        };
        anyhow::Error::new(e).context(message)
    })
}
