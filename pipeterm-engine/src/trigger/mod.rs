//! Time-based triggers
//!
//! - `cron`: expression parsing and fire-time computation
//! - `registry`: installs and cancels running triggers

pub mod cron;
pub mod registry;

use thiserror::Error;

pub use cron::{CronError, CronSchedule};
pub use registry::TriggerRegistry;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid cron expression '{expression}': {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: CronError,
    },

    #[error("cron expression '{0}' never fires")]
    NeverFires(String),
}
