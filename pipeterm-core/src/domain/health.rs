//! Health signals
//!
//! A pipeline's health is fed by two independent writers: the outcome of
//! its last execution and the periodic liveness check. Instead of letting
//! them overwrite a single flag, each source records its own signal and
//! the flag is derived from all of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a health signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthSource {
    /// Outcome of the last execution attempt
    Execution,
    /// Result of the last liveness check
    Liveness,
}

impl fmt::Display for HealthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthSource::Execution => write!(f, "execution"),
            HealthSource::Liveness => write!(f, "liveness"),
        }
    }
}

/// Latest signal from each health source
///
/// A source that has never reported counts as healthy. A pipeline is
/// healthy only when no source reports otherwise; when several report
/// unhealthy, the first one in [`HealthSignals::PRECEDENCE`] is named as
/// the cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSignals {
    pub execution: Option<bool>,
    pub liveness: Option<bool>,
}

impl HealthSignals {
    pub const PRECEDENCE: [HealthSource; 2] = [HealthSource::Execution, HealthSource::Liveness];

    /// Records the latest signal from `source`
    pub fn record(&mut self, source: HealthSource, healthy: bool) {
        match source {
            HealthSource::Execution => self.execution = Some(healthy),
            HealthSource::Liveness => self.liveness = Some(healthy),
        }
    }

    pub fn get(&self, source: HealthSource) -> Option<bool> {
        match source {
            HealthSource::Execution => self.execution,
            HealthSource::Liveness => self.liveness,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.unhealthy_source().is_none()
    }

    /// The highest-precedence source currently reporting unhealthy
    pub fn unhealthy_source(&self) -> Option<HealthSource> {
        Self::PRECEDENCE
            .iter()
            .copied()
            .find(|source| self.get(*source) == Some(false))
    }
}
