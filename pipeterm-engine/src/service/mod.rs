//! Service layer
//!
//! - `execution`: runs a pipeline's external script and reports the outcome

pub mod execution;

pub use execution::{ExecutionOutcome, ExecutionRequest, ExecutionService, ScriptExecutionService};
