//! Periodic background loops
//!
//! Both the liveness monitor and the animation ticker are "do X every N"
//! loops that stop on a shared shutdown token.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spawns a loop calling `tick` every `period` until `shutdown` fires or
/// `tick` returns false
///
/// The first call happens one period after spawning. Ticks missed while a
/// slow `tick` runs are skipped rather than replayed in a burst.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        debug!("Starting {} (interval: {:?})", name, period);

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            if !tick().await {
                break;
            }
        }

        debug!("{} stopped", name);
    })
}
