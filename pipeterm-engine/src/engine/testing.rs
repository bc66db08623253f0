//! Shared fixtures for the engine's unit tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use super::PipelineEngine;
use crate::config::EngineConfig;
use crate::monitor::AlwaysHealthy;
use crate::service::{ExecutionOutcome, ExecutionRequest, ExecutionService};
use crate::store::MemoryStore;

/// Succeeds immediately and counts how often it was called
#[derive(Default)]
pub(super) struct CountingExecutor(AtomicUsize);

impl CountingExecutor {
    pub(super) fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionService for CountingExecutor {
    async fn execute(
        &self,
        _request: ExecutionRequest,
        _cancel: CancellationToken,
    ) -> ExecutionOutcome {
        self.0.fetch_add(1, Ordering::SeqCst);
        ExecutionOutcome::Succeeded {
            output: String::new(),
        }
    }
}

pub(super) fn engine_with(
    executor: CountingExecutor,
) -> (PipelineEngine, Arc<CountingExecutor>) {
    let executor = Arc::new(executor);
    let engine = PipelineEngine::open(
        EngineConfig::new("/unused"),
        Arc::new(MemoryStore::new()),
        Arc::clone(&executor) as Arc<dyn ExecutionService>,
        Arc::new(AlwaysHealthy),
    )
    .unwrap();
    (engine, executor)
}
