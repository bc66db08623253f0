//! Pipeline command handlers
//!
//! Handles creation, listing, inspection, execution, deletion and
//! scheduling of pipelines.

use anyhow::{Context, Result};
use colored::*;
use pipeterm_core::domain::pipeline::PipelineCollection;
use pipeterm_core::dto::pipeline::{CreatePipeline, PipelineView};
use pipeterm_engine::{ExecutionOutcome, PipelineEngine, RunDispatch};
use std::path::PathBuf;
use tracing::warn;

use crate::output::{format_time, print_log_entry, print_pipeline_details, print_pipeline_table};

/// Create a new pipeline
pub fn add(engine: &PipelineEngine, name: String, script: Option<PathBuf>) -> Result<()> {
    let request = match script {
        Some(path) => CreatePipeline::custom(name, path),
        None => CreatePipeline::builtin(name),
    };

    let pipeline = engine.add(request).context("Failed to create pipeline")?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Name:   {}", pipeline.name);
    println!("  Script: {}", pipeline.script);

    Ok(())
}

/// List all pipelines
pub fn list(pipelines: &PipelineCollection, json: bool) -> Result<()> {
    let views: Vec<PipelineView> = pipelines.iter().map(PipelineView::from).collect();

    if json {
        let rendered =
            serde_json::to_string_pretty(&views).context("Failed to serialize pipelines")?;
        println!("{}", rendered);
    } else {
        print_pipeline_table(&views);
    }

    Ok(())
}

/// Show pipeline details
pub fn show(pipelines: &PipelineCollection, id: u64) -> Result<()> {
    let pipeline = pipelines
        .get(id)
        .with_context(|| format!("Pipeline not found: {}", id))?;
    print_pipeline_details(&PipelineView::from(pipeline), &pipeline.logs);
    Ok(())
}

/// Print every log line of a pipeline
pub fn logs(pipelines: &PipelineCollection, id: u64) -> Result<()> {
    let pipeline = pipelines
        .get(id)
        .with_context(|| format!("Pipeline not found: {}", id))?;

    if pipeline.logs.is_empty() {
        println!("{}", "No logs yet.".yellow());
    }
    for entry in &pipeline.logs {
        print_log_entry(entry);
    }

    Ok(())
}

/// Run a pipeline and wait for its outcome
///
/// Ctrl-C cancels the execution and still waits for it to be recorded.
pub async fn run(engine: &PipelineEngine, id: u64) -> Result<()> {
    let mut handle = match engine.run(id).context("Failed to start pipeline")? {
        RunDispatch::Started(handle) => handle,
        RunDispatch::AlreadyRunning => {
            println!(
                "{}",
                format!("Pipeline {} is already running; request ignored.", id).yellow()
            );
            return Ok(());
        }
    };

    println!("{} pipeline {}...", "Running".cyan().bold(), id);

    let report = tokio::select! {
        report = &mut handle => report,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Canceling...".yellow());
            engine.cancel(id).context("Failed to cancel pipeline")?;
            handle.await
        }
    }
    .context("Execution task failed")?;

    if let Err(e) = &report.start_persisted {
        warn!("Running state was not saved before the script started: {}", e);
    }
    if let Err(e) = &report.persisted {
        warn!("Outcome was not saved: {}", e);
    }

    match &report.outcome {
        ExecutionOutcome::Succeeded { .. } => {
            println!("{}", "✓ Pipeline executed successfully!".green().bold())
        }
        ExecutionOutcome::Canceled { .. } => {
            println!("{}", "Pipeline execution canceled.".yellow().bold())
        }
        ExecutionOutcome::Failed { error, .. } => {
            println!("{} {}", "✗ Pipeline execution failed:".red().bold(), error)
        }
        ExecutionOutcome::TimedOut { after, .. } => println!(
            "{} timed out after {}s",
            "✗ Pipeline execution failed:".red().bold(),
            after.as_secs()
        ),
    }

    let output = report.outcome.output().trim();
    if !output.is_empty() {
        println!("\n{}", "Output:".bold());
        println!("{}", output);
    }

    report.persisted.context("Failed to save pipelines")?;
    Ok(())
}

/// Delete a pipeline
pub fn delete(engine: &PipelineEngine, id: u64) -> Result<()> {
    let pipeline = engine.remove(id).context("Failed to delete pipeline")?;
    println!(
        "{}",
        format!("✓ Pipeline '{}' deleted successfully!", pipeline.name)
            .green()
            .bold()
    );
    Ok(())
}

/// Schedule a pipeline
pub fn schedule(engine: &PipelineEngine, id: u64, expression: &str) -> Result<()> {
    let pipeline = engine
        .schedule(id, expression)
        .context("Failed to schedule pipeline")?;

    println!("{}", "✓ Pipeline scheduled successfully!".green().bold());
    println!(
        "  Schedule: {}",
        pipeline.cron_expr.as_deref().unwrap_or(expression)
    );
    println!("  Next run: {}", format_time(pipeline.next_run));
    println!(
        "  {}",
        "Scheduled runs fire while `pipeterm watch` is running.".dimmed()
    );

    Ok(())
}

/// Remove a pipeline's schedule
pub fn unschedule(engine: &PipelineEngine, id: u64) -> Result<()> {
    engine
        .unschedule(id)
        .context("Failed to remove schedule")?;
    println!("{}", "✓ Schedule removed successfully!".green().bold());
    Ok(())
}
