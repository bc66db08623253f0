//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::health::{HealthSignals, HealthSource};
use super::log::LogEntry;

/// Glyphs cycled through while a pipeline is running
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Opaque handle to an installed trigger
///
/// Only meaningful inside the process that installed it, so it is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(Uuid);

impl TriggerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TriggerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Canceled,
    /// Was running when the process last stopped; the outcome was never recorded
    Unknown,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Idle => write!(f, "Idle"),
            PipelineStatus::Running => write!(f, "Running"),
            PipelineStatus::Completed => write!(f, "Completed"),
            PipelineStatus::Failed => write!(f, "Failed"),
            PipelineStatus::Canceled => write!(f, "Canceled"),
            PipelineStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which external script a pipeline runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptKind {
    /// The built-in ingestion script
    #[default]
    Builtin,
    /// A user-supplied script, handed to the custom runner script
    Custom { path: PathBuf },
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Builtin => write!(f, "built-in"),
            ScriptKind::Custom { path } => write!(f, "{}", path.display()),
        }
    }
}

/// A named, independently schedulable unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub id: u64,
    pub name: String,
    pub status: PipelineStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    /// Stored 5-field cron expression; `None` when unscheduled
    pub cron_expr: Option<String>,
    pub script: ScriptKind,
    pub health: HealthSignals,
    pub trigger: Option<TriggerHandle>,
    pub animation_frame: usize,
}

impl Pipeline {
    /// Creates an idle pipeline with its creation marker logged
    pub fn new(id: u64, name: impl Into<String>, script: ScriptKind) -> Self {
        let created = LogEntry::info("Pipeline created.");
        Self {
            id,
            name: name.into(),
            status: PipelineStatus::Idle,
            last_run: Some(created.timestamp),
            next_run: None,
            logs: vec![created],
            cron_expr: None,
            script,
            health: HealthSignals::default(),
            trigger: None,
            animation_frame: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PipelineStatus::Running
    }

    pub fn is_scheduled(&self) -> bool {
        self.cron_expr.is_some()
    }

    pub fn healthy(&self) -> bool {
        self.health.is_healthy()
    }

    pub fn log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    /// Moves the pipeline into `Running`
    pub fn begin_run(&mut self) {
        self.status = PipelineStatus::Running;
        self.animation_frame = 0;
    }

    /// Leaves `Running` with the given terminal status
    ///
    /// `last_run` is stamped regardless of outcome.
    pub fn finish_run(&mut self, status: PipelineStatus, execution_healthy: Option<bool>) {
        self.status = status;
        self.last_run = Some(Utc::now());
        self.animation_frame = 0;
        if let Some(healthy) = execution_healthy {
            self.health.record(HealthSource::Execution, healthy);
        }
    }

    /// Advances the spinner if running; returns whether it moved
    pub fn advance_frame(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.animation_frame = (self.animation_frame + 1) % SPINNER_FRAMES.len();
        true
    }

    /// Marks a pipeline left `Running` by an unclean shutdown as `Unknown`
    ///
    /// Returns whether anything changed.
    pub fn reconcile_interrupted(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = PipelineStatus::Unknown;
        self.log(LogEntry::warning(
            "Previous run was interrupted; outcome unknown",
        ));
        true
    }
}

/// All pipelines plus the next identifier to hand out
///
/// Pipelines are keyed by id; since ids only grow, iteration order is
/// creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCollection {
    pipelines: BTreeMap<u64, Pipeline>,
    next_id: u64,
}

impl Default for PipelineCollection {
    fn default() -> Self {
        Self {
            pipelines: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl PipelineCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a collection from stored parts
    ///
    /// `next_id` is raised above the largest present id if needed, so a
    /// hand-edited file can't cause an id to be handed out twice.
    pub fn from_parts(pipelines: impl IntoIterator<Item = Pipeline>, next_id: u64) -> Self {
        let pipelines: BTreeMap<u64, Pipeline> =
            pipelines.into_iter().map(|p| (p.id, p)).collect();
        let floor = pipelines.keys().next_back().map_or(1, |max| max + 1);
        Self {
            pipelines,
            next_id: next_id.max(floor),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Creates a pipeline with a fresh id and returns it
    pub fn create(&mut self, name: impl Into<String>, script: ScriptKind) -> &Pipeline {
        let id = self.next_id;
        self.next_id += 1;
        self.pipelines
            .entry(id)
            .or_insert_with(|| Pipeline::new(id, name, script))
    }

    pub fn get(&self, id: u64) -> Option<&Pipeline> {
        self.pipelines.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Pipeline> {
        self.pipelines.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<Pipeline> {
        self.pipelines.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pipelines.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pipeline> {
        self.pipelines.values_mut()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
