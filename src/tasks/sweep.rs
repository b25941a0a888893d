//! Expiry Sweep Task
//!
//! Background task that periodically removes expired in-memory entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::MemoryStore;

/// Spawns a background task that periodically removes expired entries.
///
/// The task holds only a weak reference, so it never keeps a dropped store
/// alive. It stops when the shutdown flag becomes `true`, when the sender is
/// dropped, or when the store is gone.
///
/// # Arguments
/// * `store` - Weak reference to the store to sweep
/// * `interval` - Time between sweeps
/// * `shutdown` - Stop signal owned by the cache
///
/// # Returns
/// A JoinHandle that completes once the task has stopped.
pub fn spawn_sweep_task(
    store: Weak<MemoryStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!("Starting expiry sweep task with interval of {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let Some(live) = store.upgrade() else {
                break;
            };
            let removed = live.cleanup_expired();

            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }

        info!("Expiry sweep task stopped");
    })
}
