//! Expiry Sweeper Task
//!
//! Background task that periodically removes TTL- and idle-expired records.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cache::{monotonic_millis, ExpiryPolicy, NearCacheStats, NearCacheStore};
use crate::key::MapKey;
use crate::near_cache::CacheState;
use crate::tasks::wait_for_destroy;

/// Runs one sweep over the store. Returns the number of records removed.
pub fn sweep_expired<K: MapKey, V>(
    store: &NearCacheStore<K, V>,
    stats: &NearCacheStats,
    policy: &ExpiryPolicy,
) -> usize {
    let removed = store.remove_expired(policy, monotonic_millis());
    if removed > 0 {
        stats.record_expirations(removed as u64);
    }
    removed
}

/// Runs one sweep pass, containing a panic so the next pass still runs.
/// Returns `None` if the pass panicked.
fn run_guarded_pass<F: FnOnce() -> usize>(name: &str, pass: F) -> Option<usize> {
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(0) => {
            debug!("Expiry sweep '{}': no expired records found", name);
            Some(0)
        }
        Ok(removed) => {
            info!("Expiry sweep '{}': removed {} expired records", name, removed);
            Some(removed)
        }
        Err(_) => {
            error!("Expiry sweep '{}' failed, retrying next interval", name);
            None
        }
    }
}

/// Spawns a background task that sweeps expired records every `interval`.
///
/// The task stops once `state` reports [`CacheState::Destroyed`]. A pass
/// in progress always completes before the task exits, so awaiting the
/// returned handle guarantees no further mutation from this task. A pass
/// that panics is logged and the next pass runs on schedule.
pub fn spawn_expiry_task<K, V>(
    name: String,
    store: Arc<NearCacheStore<K, V>>,
    stats: Arc<NearCacheStats>,
    policy: ExpiryPolicy,
    interval: Duration,
    mut state: watch::Receiver<CacheState>,
) -> JoinHandle<()>
where
    K: MapKey,
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting expiry sweeper for near cache '{}' with interval of {}ms",
            name,
            interval.as_millis()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_destroy(&mut state) => break,
            }

            run_guarded_pass(&name, || sweep_expired(&store, &stats, &policy));
        }

        info!("Expiry sweeper for near cache '{}' stopped", name);
    })
}
