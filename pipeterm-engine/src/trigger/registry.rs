//! Trigger registry
//!
//! Each installed trigger is a task that sleeps until its next fire time
//! and then spawns the callback. Callbacks run on their own tasks, so a
//! slow callback never delays the following fire.

use chrono::{DateTime, Local};
use pipeterm_core::domain::pipeline::TriggerHandle;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::TriggerError;
use super::cron::CronSchedule;

struct InstalledTrigger {
    expression: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns every active trigger in the process
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: Mutex<HashMap<TriggerHandle, InstalledTrigger>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `expression` and starts firing `callback` on its schedule
    ///
    /// The callback receives the handle of the trigger that fired, so it
    /// can tell a current trigger from one replaced in the meantime. Must
    /// be called from within a Tokio runtime.
    pub fn install<F, Fut>(&self, expression: &str, callback: F) -> Result<TriggerHandle, TriggerError>
    where
        F: Fn(TriggerHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let schedule = parse(expression)?;
        if schedule.next_after(&Local::now()).is_none() {
            return Err(TriggerError::NeverFires(schedule.source().to_string()));
        }

        let handle = TriggerHandle::new();
        let cancel = CancellationToken::new();
        let expression = schedule.source().to_string();
        let task = tokio::spawn(run_trigger(handle, schedule, callback, cancel.clone()));

        debug!(%handle, expression = %expression, "Trigger installed");
        self.lock().insert(
            handle,
            InstalledTrigger {
                expression,
                cancel,
                task,
            },
        );
        Ok(handle)
    }

    /// Stops a trigger; returns false if the handle was unknown
    pub fn cancel(&self, handle: TriggerHandle) -> bool {
        match self.lock().remove(&handle) {
            Some(trigger) => {
                trigger.stop();
                debug!(%handle, expression = %trigger.expression, "Trigger canceled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, handle: TriggerHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancels every trigger
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Stopping {} trigger(s)", drained.len());
        }
        for (_, trigger) in drained {
            trigger.stop();
        }
    }

    /// Next fire time of `expression` strictly after `after`
    pub fn next_fire_time(
        expression: &str,
        after: DateTime<Local>,
    ) -> Result<DateTime<Local>, TriggerError> {
        let schedule = parse(expression)?;
        schedule
            .next_after(&after)
            .ok_or_else(|| TriggerError::NeverFires(schedule.source().to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TriggerHandle, InstalledTrigger>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl InstalledTrigger {
    fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

fn parse(expression: &str) -> Result<CronSchedule, TriggerError> {
    CronSchedule::parse(expression).map_err(|source| TriggerError::InvalidExpression {
        expression: expression.trim().to_string(),
        source,
    })
}

async fn run_trigger<F, Fut>(
    handle: TriggerHandle,
    schedule: CronSchedule,
    callback: F,
    cancel: CancellationToken,
) where
    F: Fn(TriggerHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut last_fire: Option<DateTime<Local>> = None;

    loop {
        // Never compute from before the last fire, or a clock that reads
        // slightly behind would fire the same instant twice.
        let now = Local::now();
        let base = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };

        let Some(fire_at) = schedule.next_after(&base) else {
            warn!(%handle, expression = %schedule, "Trigger has no further fire times");
            break;
        };
        let wait = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        last_fire = Some(fire_at);
        debug!(%handle, fire_time = %fire_at, "Trigger fired");
        tokio::spawn(callback(handle));
    }
}
