//! Background actors and shutdown

use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{PipelineEngine, lock};
use crate::error::Result;
use crate::monitor::LivenessMonitor;
use crate::periodic::spawn_periodic;
use crate::ticker;

/// How long shutdown waits for canceled executions to record an outcome
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl PipelineEngine {
    /// Starts the liveness monitor and the animation ticker
    ///
    /// Calling it again while they run does nothing.
    pub fn start(&self) {
        let mut background = lock(&self.inner.background);
        if !background.is_empty() {
            return;
        }

        let config = &self.inner.config;
        let shutdown = self.inner.shutdown.clone();

        let engine = Arc::downgrade(&self.inner);
        background.push(spawn_periodic(
            "liveness monitor",
            config.health_interval,
            shutdown.clone(),
            move || {
                let engine = engine.clone();
                async move {
                    let Some(inner) = engine.upgrade() else {
                        return false;
                    };
                    if let Err(e) = PipelineEngine::from_inner(inner).health_pass().await {
                        warn!("Health pass failed: {}", e);
                    }
                    true
                }
            },
        ));

        let engine = Arc::downgrade(&self.inner);
        background.push(spawn_periodic(
            "animation ticker",
            config.animation_interval,
            shutdown,
            move || {
                let engine = engine.clone();
                async move {
                    match engine.upgrade() {
                        Some(inner) => {
                            PipelineEngine::from_inner(inner).animate_tick();
                            true
                        }
                        None => false,
                    }
                }
            },
        ));

        info!(
            "Background tasks started (health: {:?}, animation: {:?})",
            config.health_interval, config.animation_interval
        );
    }

    /// Checks every pipeline once and records the results
    ///
    /// Returns how many pipelines changed; nothing is saved when none did.
    pub async fn health_pass(&self) -> Result<usize> {
        let pipelines = self.list_view();
        let results = self.inner.monitor.check_all(&pipelines).await;

        let updated =
            self.with_state(|state| LivenessMonitor::apply(&mut state.pipelines, &results));
        debug!("Health pass updated {} pipeline(s)", updated);

        if updated > 0 {
            self.persist_async().await?;
        }
        Ok(updated)
    }

    /// Advances the spinner of every running pipeline once
    pub fn animate_tick(&self) -> usize {
        self.with_state(|state| ticker::advance_frames(&mut state.pipelines))
    }

    /// Stops triggers and background tasks and cancels running executions
    ///
    /// Waits briefly for canceled executions to record their outcome.
    pub async fn shutdown(&self) {
        info!("Shutting down pipeline engine");

        self.inner.shutdown.cancel();
        self.inner.triggers.shutdown();

        let in_flight = self.with_state(|state| {
            for cancel in state.runs.values() {
                cancel.cancel();
            }
            state.runs.len()
        });
        if in_flight > 0 {
            info!("Canceling {} running pipeline(s)", in_flight);
        }

        let handles: Vec<_> = lock(&self.inner.background).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.with_state(|state| !state.runs.is_empty()) {
            if Instant::now() >= deadline {
                warn!("Shutdown grace period elapsed with executions still running");
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
