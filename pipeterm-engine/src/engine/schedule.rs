//! Schedules
//!
//! A pipeline has at most one installed trigger. Replacing a schedule
//! installs the new trigger before canceling the old one, so an invalid
//! expression leaves the previous schedule untouched. Each fire carries
//! its trigger handle, and fires from a handle the pipeline no longer
//! holds are ignored.

use chrono::{DateTime, Local, Utc};
use pipeterm_core::domain::log::{LOG_TIME_FORMAT, LogEntry};
use pipeterm_core::domain::pipeline::TriggerHandle;
use pipeterm_core::dto::pipeline::PipelineView;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::PipelineEngine;
use crate::error::{EngineError, Result};
use crate::trigger::cron::{self, CronSchedule};
use crate::trigger::{TriggerError, TriggerRegistry};

/// Next fire time of a stored 5-field expression, if it parses
pub fn next_fire_utc(expression: &str) -> Option<DateTime<Utc>> {
    TriggerRegistry::next_fire_time(&cron::to_internal(expression), Local::now())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl PipelineEngine {
    /// Schedules a pipeline, replacing any previous schedule
    ///
    /// The expression is stored in its 5-field display form. On failure the
    /// previous schedule stays in place and the error is also logged on the
    /// pipeline.
    pub fn schedule(&self, id: u64, expression: &str) -> Result<PipelineView> {
        let expression = cron::to_display(expression);

        let installed = self.with_state(
            |state| -> Result<std::result::Result<PipelineView, TriggerError>> {
                let pipeline = state
                    .pipelines
                    .get_mut(id)
                    .ok_or(EngineError::NotFound(id))?;

                match self.install_trigger(id, &expression) {
                    Ok(handle) => {
                        if let Some(previous) = pipeline.trigger.replace(handle) {
                            self.inner.triggers.cancel(previous);
                        }

                        let upcoming = CronSchedule::parse(&cron::to_internal(&expression))
                            .map(|schedule| schedule.upcoming(&Local::now(), 2))
                            .unwrap_or_default();
                        pipeline.cron_expr = Some(expression.clone());
                        pipeline.next_run = upcoming.first().map(|t| t.with_timezone(&Utc));
                        pipeline.log(LogEntry::info(format!(
                            "Pipeline scheduled: {} (next runs: {})",
                            expression,
                            describe_upcoming(&upcoming)
                        )));
                        Ok(Ok(PipelineView::from(&*pipeline)))
                    }
                    Err(e) => {
                        pipeline.log(LogEntry::error(format!(
                            "Failed to schedule pipeline: {}",
                            e
                        )));
                        Ok(Err(e))
                    }
                }
            },
        )?;

        match installed {
            Ok(view) => {
                info!(pipeline_id = id, "Pipeline scheduled: {}", expression);
                self.persist()?;
                Ok(view)
            }
            Err(e) => {
                warn!(pipeline_id = id, "Failed to schedule pipeline: {}", e);
                let _ = self.persist();
                Err(e.into())
            }
        }
    }

    /// Removes a pipeline's schedule; a no-op if it has none
    pub fn unschedule(&self, id: u64) -> Result<PipelineView> {
        let (view, changed) = self.with_state(|state| -> Result<(PipelineView, bool)> {
            let pipeline = state
                .pipelines
                .get_mut(id)
                .ok_or(EngineError::NotFound(id))?;

            let changed = pipeline.is_scheduled() || pipeline.trigger.is_some();
            if let Some(handle) = pipeline.trigger.take() {
                self.inner.triggers.cancel(handle);
            }
            if changed {
                pipeline.cron_expr = None;
                pipeline.next_run = None;
                pipeline.log(LogEntry::info("Pipeline schedule removed"));
            }
            Ok((PipelineView::from(&*pipeline), changed))
        })?;

        if changed {
            info!(pipeline_id = id, "Pipeline schedule removed");
            self.persist()?;
        }
        Ok(view)
    }

    /// Installs a trigger for every scheduled pipeline
    ///
    /// Returns how many pipelines were touched, successfully or not. A bad
    /// expression keeps its text so it can be fixed, but gets no trigger
    /// and no next run.
    pub(super) fn rehydrate(&self) -> usize {
        self.with_state(|state| {
            let scheduled: Vec<(u64, String)> = state
                .pipelines
                .iter()
                .filter_map(|p| p.cron_expr.clone().map(|expr| (p.id, expr)))
                .collect();

            for (id, expression) in &scheduled {
                let installed = self.install_trigger(*id, expression);
                let Some(pipeline) = state.pipelines.get_mut(*id) else {
                    continue;
                };

                match installed {
                    Ok(handle) => {
                        pipeline.trigger = Some(handle);
                        pipeline.next_run = next_fire_utc(expression);
                        debug!(pipeline_id = id, "Restored schedule '{}'", expression);
                    }
                    Err(e) => {
                        warn!(pipeline_id = id, "Failed to restore schedule: {}", e);
                        pipeline.next_run = None;
                        pipeline.log(LogEntry::error(format!(
                            "Failed to restore schedule: {}",
                            e
                        )));
                    }
                }
            }

            scheduled.len()
        })
    }

    fn install_trigger(
        &self,
        id: u64,
        expression: &str,
    ) -> std::result::Result<TriggerHandle, TriggerError> {
        let engine = Arc::downgrade(&self.inner);
        self.inner
            .triggers
            .install(&cron::to_internal(expression), move |handle| {
                let engine = engine.clone();
                async move {
                    if let Some(inner) = engine.upgrade() {
                        PipelineEngine::from_inner(inner).on_trigger(id, handle).await;
                    }
                }
            })
    }

    async fn on_trigger(&self, id: u64, handle: TriggerHandle) {
        let fired = self.with_state(|state| {
            let pipeline = state.pipelines.get_mut(id)?;
            if pipeline.trigger != Some(handle) {
                return None;
            }

            pipeline.next_run = pipeline.cron_expr.as_deref().and_then(next_fire_utc);
            if pipeline.is_running() {
                return Some(None);
            }

            pipeline.log(LogEntry::info("Cron trigger: starting pipeline execution"));
            Some(state.claim_run(id).ok().flatten())
        });

        match fired {
            None => debug!(pipeline_id = id, %handle, "Ignoring fire from a stale trigger"),
            Some(None) => {
                warn!(pipeline_id = id, "Scheduled run skipped: pipeline is still running");
                // Only next_run moved; a failed save is already logged
                let _ = self.persist_async().await;
            }
            Some(Some((request, cancel))) => {
                info!(pipeline_id = id, "Cron trigger: starting pipeline execution");
                self.execute(request, cancel).await;
            }
        }
    }
}

fn describe_upcoming(times: &[DateTime<Local>]) -> String {
    times
        .iter()
        .map(|t| t.format(LOG_TIME_FORMAT).to_string())
        .collect::<Vec<_>>()
        .join(", then ")
}
