//! Terminal output helpers

use chrono::{DateTime, Local, Utc};
use colored::*;
use pipeterm_core::domain::log::{LOG_TIME_FORMAT, LogEntry, LogLevel};
use pipeterm_core::domain::pipeline::PipelineStatus;
use pipeterm_core::dto::pipeline::PipelineView;

/// Formats an optional UTC timestamp in local time
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(t) => t.with_timezone(&Local).format(LOG_TIME_FORMAT).to_string(),
        None => "—".to_string(),
    }
}

fn colored_status(status: PipelineStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        PipelineStatus::Idle => text.normal(),
        PipelineStatus::Running => text.cyan().bold(),
        PipelineStatus::Completed => text.green(),
        PipelineStatus::Failed => text.red().bold(),
        PipelineStatus::Canceled | PipelineStatus::Unknown => text.yellow(),
    }
}

fn colored_glyph(pipeline: &PipelineView) -> ColoredString {
    let glyph = pipeline.glyph();
    if pipeline.is_running() {
        glyph.cyan()
    } else if pipeline.healthy {
        glyph.green()
    } else {
        glyph.red()
    }
}

/// Print the pipeline table
pub fn print_pipeline_table(pipelines: &[PipelineView]) {
    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
        return;
    }

    let name_width = pipelines
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    println!(
        "{}",
        format!(
            "   {:>4}  {:<name_width$}  {:<10}  {:<19}  {:<19}  {}",
            "ID", "NAME", "STATUS", "LAST RUN", "NEXT RUN", "SCHEDULE"
        )
        .bold()
    );
    println!("{}", "─".repeat(80).dimmed());

    for pipeline in pipelines {
        println!(
            " {} {:>4}  {:<name_width$}  {}  {:<19}  {:<19}  {}",
            colored_glyph(pipeline),
            pipeline.id,
            pipeline.name,
            status_cell(pipeline.status, 10),
            format_time(pipeline.last_run),
            format_time(pipeline.next_run),
            pipeline.cron_expr.as_deref().unwrap_or("—").dimmed(),
        );
    }
}

/// Colored status padded to `width` columns
///
/// Padding is added outside the escape codes so columns stay aligned.
fn status_cell(status: PipelineStatus, width: usize) -> String {
    let padding = width.saturating_sub(status.to_string().len());
    format!("{}{}", colored_status(status), " ".repeat(padding))
}

/// Print detailed pipeline information
pub fn print_pipeline_details(pipeline: &PipelineView, logs: &[LogEntry]) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:         {}", pipeline.id.to_string().cyan());
    println!("  Name:       {}", pipeline.name.bold());
    println!("  Status:     {}", colored_status(pipeline.status));
    match pipeline.unhealthy_source {
        None => println!("  Health:     {}", "healthy".green()),
        Some(source) => println!(
            "  Health:     {} (last {} check failed)",
            "unhealthy".red(),
            source
        ),
    }
    println!("  Script:     {}", pipeline.script);
    println!(
        "  Schedule:   {}",
        pipeline.cron_expr.as_deref().unwrap_or("none")
    );
    println!("  Last run:   {}", format_time(pipeline.last_run));
    println!("  Next run:   {}", format_time(pipeline.next_run));

    println!("\n{}", "Recent logs:".bold());
    println!("{}", "─".repeat(80).dimmed());
    let skip = logs.len().saturating_sub(5);
    for entry in &logs[skip..] {
        print_log_entry(entry);
    }
    println!("{}", "─".repeat(80).dimmed());
}

/// Print one log line, colored by level
pub fn print_log_entry(entry: &LogEntry) {
    let line = entry.to_string();
    match entry.level {
        LogLevel::Error => println!("{}", line.red()),
        LogLevel::Warning => println!("{}", line.yellow()),
        LogLevel::Debug => println!("{}", line.dimmed()),
        LogLevel::Info => println!("{}", line),
    }
}
