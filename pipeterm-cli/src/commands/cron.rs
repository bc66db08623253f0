//! Cron preview
//!
//! Shows when an expression would fire without touching any pipeline.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use pipeterm_core::domain::log::LOG_TIME_FORMAT;
use pipeterm_engine::CronSchedule;
use pipeterm_engine::trigger::cron::{to_display, to_internal};

/// Print the next `count` fire times of `expression`
pub fn preview(expression: &str, count: usize) -> Result<()> {
    let times = upcoming(expression, &Local::now(), count)?;

    if times.is_empty() {
        println!("{}", "This expression never fires.".yellow());
        return Ok(());
    }

    println!("{} {}", "Schedule:".bold(), to_display(expression));
    for time in times {
        println!("  {}", time.format(LOG_TIME_FORMAT));
    }

    Ok(())
}

fn upcoming(
    expression: &str,
    after: &DateTime<Local>,
    count: usize,
) -> Result<Vec<DateTime<Local>>> {
    let schedule = CronSchedule::parse(&to_internal(expression))
        .with_context(|| format!("Invalid cron expression '{}'", expression))?;
    Ok(schedule.upcoming(after, count))
}
