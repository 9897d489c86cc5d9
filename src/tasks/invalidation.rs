//! Invalidation Listener Task
//!
//! Consumes change notifications from the remote map and drops the affected
//! local records. Delivery is asynchronous, so a read may still observe the
//! old record for a short while after the remote change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{MapValue, NearCacheStats, NearCacheStore};
use crate::key::MapKey;
use crate::near_cache::CacheState;
use crate::remote::{Invalidation, InvalidationTarget, RemoteMap};
use crate::tasks::wait_for_destroy;

/// Applies one notification to the store. Returns the number of records removed.
///
/// A per-key notification whose sequence is not newer than the cached
/// record's is ignored.
pub fn apply_invalidation<K: MapKey, V>(
    store: &NearCacheStore<K, V>,
    stats: &NearCacheStats,
    invalidation: Invalidation<K>,
) -> usize {
    let removed = match invalidation.target {
        InvalidationTarget::Key(key) => {
            usize::from(store.remove_unless_newer(&key, invalidation.sequence))
        }
        InvalidationTarget::All => store.clear(),
    };
    if removed > 0 {
        stats.record_invalidations(removed as u64);
    }
    removed
}

/// Drops everything cached, since notifications may have been missed.
fn discard_unverified<K: MapKey, V>(name: &str, store: &NearCacheStore<K, V>, stats: &NearCacheStats) {
    let cleared = store.clear();
    if cleared > 0 {
        stats.record_invalidations(cleared as u64);
        warn!(
            "Near cache '{}': dropped {} records after losing invalidation events",
            name, cleared
        );
    }
}

/// Spawns the listener for the map named `name`.
///
/// Every successful subscription, the first included, starts from an empty
/// store, since records cached before it are covered by no notification.
/// If the subscription cannot be established, or the stream closes or
/// lags behind, the local store is cleared and the listener resubscribes
/// after `retry_interval`. The task stops once `state` reports
/// [`CacheState::Destroyed`], after finishing the notification in hand.
pub fn spawn_invalidation_task<K, V>(
    name: String,
    store: Arc<NearCacheStore<K, V>>,
    stats: Arc<NearCacheStats>,
    remote: Arc<dyn RemoteMap<K, V>>,
    retry_interval: Duration,
    mut state: watch::Receiver<CacheState>,
) -> JoinHandle<()>
where
    K: MapKey,
    V: MapValue,
{
    tokio::spawn(async move {
        info!("Starting invalidation listener for near cache '{}'", name);

        'subscribe: loop {
            let subscription = tokio::select! {
                result = remote.subscribe_invalidations(&name) => result,
                _ = wait_for_destroy(&mut state) => break 'subscribe,
            };

            match subscription {
                Ok(mut stream) => {
                    // records populated before this subscription were never covered
                    discard_unverified(&name, &store, &stats);
                    info!("Invalidation listener for '{}' subscribed", name);

                    loop {
                        let received = tokio::select! {
                            received = stream.recv() => received,
                            _ = wait_for_destroy(&mut state) => break 'subscribe,
                        };

                        match received {
                            Ok(invalidation) => {
                                let removed = apply_invalidation(&store, &stats, invalidation);
                                debug!("Invalidation for '{}': removed {} records", name, removed);
                            }
                            Err(RecvError::Lagged(missed)) => {
                                warn!(
                                    "Invalidation listener for '{}' lagged, {} notifications lost",
                                    name, missed
                                );
                                discard_unverified(&name, &store, &stats);
                            }
                            Err(RecvError::Closed) => {
                                warn!("Invalidation stream for '{}' closed", name);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Invalidation subscription for '{}' failed: {}", name, e);
                }
            }

            discard_unverified(&name, &store, &stats);

            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = wait_for_destroy(&mut state) => break 'subscribe,
            }
        }

        info!("Invalidation listener for near cache '{}' stopped", name);
    })
}
