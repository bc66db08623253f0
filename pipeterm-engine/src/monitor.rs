//! Liveness monitor
//!
//! Periodically asks a [`HealthCheck`] about every pipeline and records the
//! answer as the pipeline's liveness signal. The check never touches the
//! execution signal, so a passing check can't hide a failed run.

use async_trait::async_trait;
use pipeterm_core::domain::health::HealthSource;
use pipeterm_core::domain::pipeline::PipelineCollection;
use pipeterm_core::dto::pipeline::PipelineView;
use std::sync::Arc;
use tracing::debug;

/// Answers whether a pipeline looks alive
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, pipeline: &PipelineView) -> bool;
}

/// Reports every pipeline healthy
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl HealthCheck for AlwaysHealthy {
    async fn check(&self, _pipeline: &PipelineView) -> bool {
        true
    }
}

/// Liveness results for one pass, keyed by pipeline id
pub type CheckResults = Vec<(u64, bool)>;

pub struct LivenessMonitor {
    check: Arc<dyn HealthCheck>,
}

impl LivenessMonitor {
    pub fn new(check: Arc<dyn HealthCheck>) -> Self {
        Self { check }
    }

    /// Checks every pipeline in `pipelines`
    ///
    /// Runs outside the state lock; results are applied afterwards with
    /// [`LivenessMonitor::apply`].
    pub async fn check_all(&self, pipelines: &[PipelineView]) -> CheckResults {
        let mut results = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let healthy = self.check.check(pipeline).await;
            if !healthy {
                debug!(pipeline_id = pipeline.id, "Liveness check failed");
            }
            results.push((pipeline.id, healthy));
        }
        results
    }

    /// Records check results; pipelines deleted since the check are skipped
    ///
    /// Returns how many liveness signals changed; repeating a result is not
    /// a change.
    pub fn apply(pipelines: &mut PipelineCollection, results: &CheckResults) -> usize {
        let mut updated = 0;
        for (id, healthy) in results {
            let Some(pipeline) = pipelines.get_mut(*id) else {
                continue;
            };
            if pipeline.health.liveness != Some(*healthy) {
                pipeline.health.record(HealthSource::Liveness, *healthy);
                updated += 1;
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeterm_core::domain::pipeline::ScriptKind;

    struct FailNamed(&'static str);

    #[async_trait]
    impl HealthCheck for FailNamed {
        async fn check(&self, pipeline: &PipelineView) -> bool {
            pipeline.name != self.0
        }
    }

    #[tokio::test]
    async fn test_check_and_apply() {
        let mut pipelines = PipelineCollection::new();
        pipelines.create("good", ScriptKind::Builtin);
        pipelines.create("bad", ScriptKind::Builtin);
        let views: Vec<PipelineView> = pipelines.iter().map(PipelineView::from).collect();

        let monitor = LivenessMonitor::new(Arc::new(FailNamed("bad")));
        let results = monitor.check_all(&views).await;
        assert_eq!(results, vec![(1, true), (2, false)]);

        pipelines.remove(1);
        assert_eq!(LivenessMonitor::apply(&mut pipelines, &results), 1);
        assert!(!pipelines.get(2).unwrap().healthy());
        assert_eq!(pipelines.get(2).unwrap().health.liveness, Some(false));
    }

    #[tokio::test]
    async fn test_repeated_results_are_not_changes() {
        let mut pipelines = PipelineCollection::new();
        pipelines.create("a", ScriptKind::Builtin);
        pipelines.create("b", ScriptKind::Builtin);
        let views: Vec<PipelineView> = pipelines.iter().map(PipelineView::from).collect();

        let monitor = LivenessMonitor::new(Arc::new(FailNamed("b")));
        let results = monitor.check_all(&views).await;
        assert_eq!(LivenessMonitor::apply(&mut pipelines, &results), 2);
        assert_eq!(LivenessMonitor::apply(&mut pipelines, &results), 0);

        let flipped = vec![(1, true), (2, true)];
        assert_eq!(LivenessMonitor::apply(&mut pipelines, &flipped), 1);
        assert!(pipelines.get(2).unwrap().healthy());
    }

    #[tokio::test]
    async fn test_liveness_does_not_override_failed_execution() {
        let mut pipelines = PipelineCollection::new();
        pipelines.create("p", ScriptKind::Builtin);
        pipelines
            .get_mut(1)
            .unwrap()
            .health
            .record(HealthSource::Execution, false);
        let views: Vec<PipelineView> = pipelines.iter().map(PipelineView::from).collect();

        let results = LivenessMonitor::new(Arc::new(AlwaysHealthy))
            .check_all(&views)
            .await;
        LivenessMonitor::apply(&mut pipelines, &results);

        assert!(!pipelines.get(1).unwrap().healthy());
    }
}
