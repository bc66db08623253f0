//! Pipeterm Engine
//!
//! Owns the pipeline collection and everything that mutates it.
//!
//! Architecture:
//! - Configuration: storage location, interpreter and script paths, intervals
//! - Store: full-snapshot persistence of the collection
//! - Trigger: cron parsing and the registry that fires schedules
//! - Service: the execution supervisor that runs external scripts
//! - Monitor / ticker: the two periodic background actors
//! - Engine: composes the above behind a single state lock
//!
//! Every mutation goes through [`PipelineEngine`], which persists the
//! collection afterwards. External processes run on their own tasks,
//! outside the state lock.

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod periodic;
pub mod service;
pub mod store;
pub mod ticker;
pub mod trigger;

pub use config::EngineConfig;
pub use engine::{PipelineEngine, RunDispatch, RunReport};
pub use error::{EngineError, Result};
pub use monitor::{AlwaysHealthy, HealthCheck, LivenessMonitor};
pub use service::{ExecutionOutcome, ExecutionRequest, ExecutionService, ScriptExecutionService};
pub use store::{FileStore, MemoryStore, PipelineStore, StoreError};
pub use trigger::{CronSchedule, TriggerError, TriggerRegistry};
