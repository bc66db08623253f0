//! Watch mode
//!
//! Long-running mode: schedules fire, health checks and the spinner run in
//! the background, and the table is redrawn until Ctrl-C.

use anyhow::Result;
use colored::*;
use pipeterm_engine::PipelineEngine;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::info;

use crate::output::print_pipeline_table;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

pub async fn watch(engine: &PipelineEngine, refresh_ms: u64) -> Result<()> {
    engine.start();
    info!("Watching {} pipeline(s)", engine.list_view().len());

    let mut redraw = interval(Duration::from_millis(refresh_ms.max(50)));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = redraw.tick() => {
                print!("{}", CLEAR_SCREEN);
                println!(
                    "{}  {}\n",
                    "pipeterm".bold(),
                    "Ctrl-C to quit".dimmed()
                );
                print_pipeline_table(&engine.list_view());
            }
            _ = &mut ctrl_c => break,
        }
    }

    println!();
    engine.shutdown().await;
    println!("{}", "Stopped.".dimmed());
    Ok(())
}
