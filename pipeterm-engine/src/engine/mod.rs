//! Pipeline engine
//!
//! The single owner of the pipeline collection. Front ends, trigger
//! callbacks and the background actors all go through it.
//!
//! Concurrency model:
//! - Collection state lives behind one `std::sync::Mutex` that is never
//!   held across an `.await`
//! - External scripts run on their own tasks; only the claim and the final
//!   outcome touch the lock
//! - Saves are ordered by a separate gate, so a slow write never blocks
//!   readers of the collection
//! - Trigger callbacks and background loops hold a `Weak` reference and
//!   stop once the engine is dropped

mod background;
mod run;
mod schedule;
#[cfg(test)]
mod testing;

pub use run::{RunDispatch, RunReport};
pub use schedule::next_fire_utc;

use pipeterm_core::domain::log::LogEntry;
use pipeterm_core::domain::pipeline::{PipelineCollection, ScriptKind};
use pipeterm_core::dto::pipeline::{CreatePipeline, PipelineView};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::monitor::{AlwaysHealthy, HealthCheck, LivenessMonitor};
use crate::service::{ExecutionService, ScriptExecutionService};
use crate::store::{FileStore, PipelineStore, StoreError};
use crate::trigger::TriggerRegistry;

const MAX_NAME_LEN: usize = 255;

#[derive(Default)]
struct EngineState {
    pipelines: PipelineCollection,
    /// Cancellation tokens of in-flight executions
    runs: HashMap<u64, CancellationToken>,
}

struct EngineInner {
    config: EngineConfig,
    state: Mutex<EngineState>,
    save_gate: Mutex<()>,
    store: Arc<dyn PipelineStore>,
    executor: Arc<dyn ExecutionService>,
    monitor: LivenessMonitor,
    triggers: TriggerRegistry,
    shutdown: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the engine; clones share the same state
#[derive(Clone)]
pub struct PipelineEngine {
    inner: Arc<EngineInner>,
}

impl PipelineEngine {
    /// Loads the collection from `store` and re-installs every schedule
    ///
    /// Pipelines left `Running` by an unclean shutdown become `Unknown`.
    /// A schedule that fails to install is logged on its pipeline and does
    /// not stop the others. Must be called from within a Tokio runtime.
    pub fn open(
        config: EngineConfig,
        store: Arc<dyn PipelineStore>,
        executor: Arc<dyn ExecutionService>,
        health: Arc<dyn HealthCheck>,
    ) -> Result<Self> {
        let mut pipelines = store.load()?;

        let interrupted = pipelines
            .iter_mut()
            .map(|p| p.reconcile_interrupted())
            .filter(|changed| *changed)
            .count();
        if interrupted > 0 {
            warn!(
                "{} pipeline(s) were running when pipeterm last stopped; marked unknown",
                interrupted
            );
        }

        let engine = Self::from_inner(Arc::new(EngineInner {
            config,
            state: Mutex::new(EngineState {
                pipelines,
                runs: HashMap::new(),
            }),
            save_gate: Mutex::new(()),
            store,
            executor,
            monitor: LivenessMonitor::new(health),
            triggers: TriggerRegistry::new(),
            shutdown: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        }));

        let restored = engine.rehydrate();
        info!(
            "Loaded {} pipeline(s), {} schedule(s) restored",
            engine.with_state(|state| state.pipelines.len()),
            engine.active_triggers()
        );

        if (interrupted > 0 || restored > 0) && engine.persist().is_err() {
            warn!("Continuing with unsaved changes");
        }

        Ok(engine)
    }

    /// Opens the engine with the JSON file store, the script executor and
    /// an always-healthy liveness check
    ///
    /// The storage directory is locked for the engine's lifetime; a second
    /// engine on the same directory fails with [`EngineError::is_locked`].
    pub fn with_defaults(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open_exclusive(config.storage_dir.clone())?);
        let executor = Arc::new(ScriptExecutionService::from_config(&config));
        Self::open(config, store, executor, Arc::new(AlwaysHealthy))
    }

    fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Creates a pipeline with the next id
    pub fn add(&self, request: CreatePipeline) -> Result<PipelineView> {
        let CreatePipeline { name, script } = request;
        let name = name.trim();

        if name.is_empty() {
            return Err(EngineError::Validation(
                "Pipeline name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation(format!(
                "Pipeline name cannot exceed {} characters",
                MAX_NAME_LEN
            )));
        }
        if matches!(&script, ScriptKind::Custom { path } if path.as_os_str().is_empty()) {
            return Err(EngineError::Validation(
                "Custom script path cannot be empty".to_string(),
            ));
        }

        let view = self.with_state(|state| PipelineView::from(state.pipelines.create(name, script)));
        info!(pipeline_id = view.id, "Pipeline '{}' created", view.name);

        self.persist()?;
        Ok(view)
    }

    /// Deletes a pipeline, stopping its trigger and any execution in flight
    ///
    /// An outcome arriving after deletion is discarded.
    pub fn remove(&self, id: u64) -> Result<PipelineView> {
        let removed = self.with_state(|state| -> Result<PipelineView> {
            let pipeline = state
                .pipelines
                .remove(id)
                .ok_or(EngineError::NotFound(id))?;
            if let Some(handle) = pipeline.trigger {
                self.inner.triggers.cancel(handle);
            }
            if let Some(cancel) = state.runs.remove(&id) {
                cancel.cancel();
            }
            Ok(PipelineView::from(&pipeline))
        })?;
        info!(pipeline_id = id, "Pipeline '{}' deleted", removed.name);

        self.persist()?;
        Ok(removed)
    }

    /// Snapshot of every pipeline in creation order
    pub fn list_view(&self) -> Vec<PipelineView> {
        self.with_state(|state| state.pipelines.iter().map(PipelineView::from).collect())
    }

    pub fn get(&self, id: u64) -> Option<PipelineView> {
        self.with_state(|state| state.pipelines.get(id).map(PipelineView::from))
    }

    pub fn logs(&self, id: u64) -> Result<Vec<LogEntry>> {
        self.with_state(|state| {
            state
                .pipelines
                .get(id)
                .map(|p| p.logs.clone())
                .ok_or(EngineError::NotFound(id))
        })
    }

    /// Number of triggers currently installed
    pub fn active_triggers(&self) -> usize {
        self.inner.triggers.active_count()
    }

    /// Writes the current collection to the store
    ///
    /// Blocks on I/O. Failures are logged here as well as returned.
    pub fn persist(&self) -> Result<()> {
        let _gate = lock(&self.inner.save_gate);
        let snapshot = self.with_state(|state| state.pipelines.clone());

        self.inner.store.save(&snapshot).map_err(|e| {
            error!("Failed to save pipelines: {}", e);
            EngineError::from(e)
        })
    }

    /// [`persist`](Self::persist) on the blocking pool, for async paths
    pub(crate) async fn persist_async(&self) -> Result<()> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.persist())
            .await
            .unwrap_or_else(|e| {
                error!("Save task failed: {}", e);
                Err(StoreError::Unavailable(format!("save task failed: {}", e)).into())
            })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut lock(&self.inner.state))
    }
}

/// Locks `mutex`, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
