//! Execution dispatch
//!
//! A run is claimed under the state lock (status flips to `Running` there,
//! so two claims can't both succeed), executed on its own task, and
//! finished under the lock again.

use pipeterm_core::domain::pipeline::PipelineStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{EngineState, PipelineEngine};
use crate::error::{EngineError, Result};
use crate::service::{ExecutionOutcome, ExecutionRequest};

/// What happened to a finished execution
#[derive(Debug)]
pub struct RunReport {
    pub pipeline_id: u64,
    pub outcome: ExecutionOutcome,
    /// Whether `Running` reached the store before the script started
    pub start_persisted: Result<()>,
    /// Whether the outcome reached the store
    pub persisted: Result<()>,
}

/// Result of asking for a run
#[derive(Debug)]
pub enum RunDispatch {
    /// The execution is underway; the handle resolves once its outcome is
    /// recorded
    Started(JoinHandle<RunReport>),
    /// The pipeline was already running; nothing changed
    AlreadyRunning,
}

impl RunDispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

impl PipelineEngine {
    /// Starts executing a pipeline
    ///
    /// Returns [`RunDispatch::AlreadyRunning`] without touching state if an
    /// execution is in flight.
    pub fn run(&self, id: u64) -> Result<RunDispatch> {
        let claimed = self.with_state(|state| state.claim_run(id))?;

        match claimed {
            Some((request, cancel)) => {
                info!(pipeline_id = id, "Starting pipeline '{}'", request.pipeline_name);
                let engine = self.clone();
                Ok(RunDispatch::Started(tokio::spawn(async move {
                    engine.execute(request, cancel).await
                })))
            }
            None => {
                info!(pipeline_id = id, "Pipeline is already running; ignoring run request");
                Ok(RunDispatch::AlreadyRunning)
            }
        }
    }

    /// Cancels the execution in flight; returns false if there was none
    pub fn cancel(&self, id: u64) -> Result<bool> {
        self.with_state(|state| {
            if !state.pipelines.contains(id) {
                return Err(EngineError::NotFound(id));
            }
            Ok(match state.runs.get(&id) {
                Some(cancel) => {
                    info!(pipeline_id = id, "Canceling pipeline execution");
                    cancel.cancel();
                    true
                }
                None => false,
            })
        })
    }

    /// Runs a claimed execution and records its outcome
    pub(super) async fn execute(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> RunReport {
        let pipeline_id = request.pipeline_id;

        // The run goes ahead even if `Running` could not be saved
        let start_persisted = self.persist_async().await;

        let outcome = if cancel.is_cancelled() {
            // Deleted or canceled while the claim was being saved
            debug!(pipeline_id, "Canceled before the script started");
            ExecutionOutcome::Canceled {
                output: String::new(),
            }
        } else {
            self.spawn_executor(request, cancel).await
        };

        let persisted = if self.finish_run(pipeline_id, &outcome) {
            self.persist_async().await
        } else {
            Ok(())
        };
        RunReport {
            pipeline_id,
            outcome,
            start_persisted,
            persisted,
        }
    }

    /// Runs the executor on its own task; a panicking executor must still
    /// leave `Running`
    async fn spawn_executor(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let pipeline_id = request.pipeline_id;
        let executor = Arc::clone(&self.inner.executor);
        let task = tokio::spawn(async move { executor.execute(request, cancel).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(pipeline_id, "Execution task failed: {}", e);
                ExecutionOutcome::Failed {
                    error: format!("execution task failed: {}", e),
                    output: String::new(),
                }
            }
        }
    }

    /// Records the outcome; false if the pipeline was deleted meanwhile
    fn finish_run(&self, id: u64, outcome: &ExecutionOutcome) -> bool {
        let applied = self.with_state(|state| {
            state.runs.remove(&id);
            match state.pipelines.get_mut(id) {
                Some(pipeline) => {
                    pipeline.finish_run(outcome.status(), outcome.execution_healthy());
                    pipeline.log(outcome.to_log_entry());
                    true
                }
                None => false,
            }
        });

        if !applied {
            debug!(pipeline_id = id, "Pipeline deleted during execution; outcome discarded");
            return false;
        }

        match outcome.status() {
            PipelineStatus::Completed => info!(pipeline_id = id, "Pipeline completed"),
            status => info!(pipeline_id = id, "Pipeline finished with status {}", status),
        }
        true
    }
}

impl EngineState {
    /// Moves an idle pipeline into `Running` and registers its cancel token
    ///
    /// `Ok(None)` means it was already running.
    pub(super) fn claim_run(
        &mut self,
        id: u64,
    ) -> Result<Option<(ExecutionRequest, CancellationToken)>> {
        let pipeline = self
            .pipelines
            .get_mut(id)
            .ok_or(EngineError::NotFound(id))?;
        if pipeline.is_running() {
            return Ok(None);
        }

        pipeline.begin_run();
        let request = ExecutionRequest {
            pipeline_id: id,
            pipeline_name: pipeline.name.clone(),
            script: pipeline.script.clone(),
        };

        let cancel = CancellationToken::new();
        self.runs.insert(id, cancel.clone());
        Ok(Some((request, cancel)))
    }
}
