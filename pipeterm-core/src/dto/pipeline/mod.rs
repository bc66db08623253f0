//! Pipeline DTOs for the front end

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::health::HealthSource;
use crate::domain::pipeline::{Pipeline, PipelineStatus, SPINNER_FRAMES, ScriptKind};

/// Request to create a new pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    #[serde(default)]
    pub script: ScriptKind,
}

impl CreatePipeline {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: ScriptKind::Builtin,
        }
    }

    pub fn custom(name: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            name: name.into(),
            script: ScriptKind::Custom { path: path.into() },
        }
    }
}

/// Read-only snapshot of a pipeline
///
/// Holds neither the trigger handle nor the log; the log is fetched per
/// pipeline on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineView {
    pub id: u64,
    pub name: String,
    pub status: PipelineStatus,
    pub healthy: bool,
    pub unhealthy_source: Option<HealthSource>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub cron_expr: Option<String>,
    pub script: ScriptKind,
    pub animation_frame: usize,
}

impl From<&Pipeline> for PipelineView {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name.clone(),
            status: pipeline.status,
            healthy: pipeline.healthy(),
            unhealthy_source: pipeline.health.unhealthy_source(),
            last_run: pipeline.last_run,
            next_run: pipeline.next_run,
            cron_expr: pipeline.cron_expr.clone(),
            script: pipeline.script.clone(),
            animation_frame: pipeline.animation_frame,
        }
    }
}

impl PipelineView {
    pub fn is_running(&self) -> bool {
        self.status == PipelineStatus::Running
    }

    /// Status glyph: the current spinner frame while running, otherwise a
    /// health mark
    pub fn glyph(&self) -> &'static str {
        if self.is_running() {
            SPINNER_FRAMES[self.animation_frame % SPINNER_FRAMES.len()]
        } else if self.healthy {
            "✔"
        } else {
            "✖"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_copies_durable_fields() {
        let mut pipeline = Pipeline::new(3, "Sales", ScriptKind::Builtin);
        pipeline.cron_expr = Some("*/5 * * * *".to_string());
        pipeline.trigger = Some(crate::domain::pipeline::TriggerHandle::new());

        let view = PipelineView::from(&pipeline);
        assert_eq!(view.id, 3);
        assert_eq!(view.name, "Sales");
        assert_eq!(view.cron_expr.as_deref(), Some("*/5 * * * *"));
    }

    #[test]
    fn test_view_json_has_no_trigger_handle_or_logs() {
        let mut pipeline = Pipeline::new(1, "p", ScriptKind::Builtin);
        pipeline.trigger = Some(crate::domain::pipeline::TriggerHandle::new());
        assert!(!pipeline.logs.is_empty());

        let json = serde_json::to_value(PipelineView::from(&pipeline)).unwrap();
        assert!(json.get("trigger").is_none());
        assert!(json.get("logs").is_none());
    }

    #[test]
    fn test_glyph() {
        let mut pipeline = Pipeline::new(1, "p", ScriptKind::Builtin);
        assert_eq!(PipelineView::from(&pipeline).glyph(), "✔");

        pipeline.begin_run();
        pipeline.advance_frame();
        assert_eq!(PipelineView::from(&pipeline).glyph(), SPINNER_FRAMES[1]);

        pipeline.finish_run(PipelineStatus::Failed, Some(false));
        assert_eq!(PipelineView::from(&pipeline).glyph(), "✖");
    }
}
