//! Error types for the pipeline engine

use thiserror::Error;

use crate::store::StoreError;
use crate::trigger::TriggerError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by [`crate::PipelineEngine`] operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// No pipeline with this id
    #[error("Pipeline not found: {0}")]
    NotFound(u64),

    /// The request was rejected before any state changed
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The cron expression could not be installed
    #[error("Failed to schedule pipeline: {0}")]
    Schedule(#[from] TriggerError),

    /// The in-memory change happened but could not be written
    #[error("Failed to persist pipelines: {0}")]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the operation took effect in memory but was not saved
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Check if another process owns the storage directory
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Persistence(StoreError::Locked { .. }))
    }
}
