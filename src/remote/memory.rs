//! In-memory remote map.
//!
//! An authoritative map living in the same process. Every mutation bumps a
//! map-wide sequence and publishes an invalidation for it. Used by the demo
//! binary and by tests in place of a cluster client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::cache::MapValue;
use crate::key::MapKey;
use crate::remote::{Invalidation, InvalidationStream, RemoteError, RemoteMap};

/// Buffered notifications per subscriber before it is reported as lagging.
const INVALIDATION_BUFFER: usize = 1024;

struct MapState<K, V> {
    entries: HashMap<K, V>,
    sequence: u64,
}

// == In Memory Remote Map ==
pub struct InMemoryRemoteMap<K, V> {
    name: String,
    state: RwLock<MapState<K, V>>,
    invalidations: Mutex<broadcast::Sender<Invalidation<K>>>,
    fetches: AtomicU64,
    unavailable: AtomicBool,
}

impl<K: MapKey, V: MapValue> InMemoryRemoteMap<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(INVALIDATION_BUFFER);
        Self {
            name: name.into(),
            state: RwLock::new(MapState {
                entries: HashMap::new(),
                sequence: 0,
            }),
            invalidations: Mutex::new(sender),
            fetches: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Mutations ==
    /// Stores `value` under `key` and notifies subscribers.
    pub async fn put(&self, key: K, value: V) -> Option<V> {
        let mut state = self.state.write().await;
        let previous = state.entries.insert(key.clone(), value);
        state.sequence += 1;
        self.publish(Invalidation::key(key, Some(state.sequence)));
        previous
    }

    /// Removes `key` and notifies subscribers if it existed.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.write().await;
        let previous = state.entries.remove(key);
        if previous.is_some() {
            state.sequence += 1;
            self.publish(Invalidation::key(key.clone(), Some(state.sequence)));
        }
        previous
    }

    /// Removes every key and notifies subscribers once.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.sequence += 1;
        self.publish(Invalidation::all(Some(state.sequence)));
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    // == Test Controls ==
    /// Number of reads served so far; each is one avoided-or-not round trip.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Makes subsequent reads and subscriptions fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of open invalidation subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.invalidations.lock().receiver_count()
    }

    /// Closes every open subscription, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        let (sender, _) = broadcast::channel(INVALIDATION_BUFFER);
        let old = std::mem::replace(&mut *self.invalidations.lock(), sender);
        debug!(
            "Remote map '{}': closed {} subscriptions",
            self.name,
            old.receiver_count()
        );
    }

    fn publish(&self, invalidation: Invalidation<K>) {
        // no subscribers is not an error
        let _ = self.invalidations.lock().send(invalidation);
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(RemoteError::Unavailable(format!(
                "remote map '{}' is unreachable",
                self.name
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<K: MapKey, V: MapValue> RemoteMap<K, V> for InMemoryRemoteMap<K, V> {
    async fn fetch(&self, key: &K) -> Result<Option<V>, RemoteError> {
        Ok(self.fetch_sequenced(key).await?.0)
    }

    async fn fetch_sequenced(&self, key: &K) -> Result<(Option<V>, Option<u64>), RemoteError> {
        self.check_available()?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read().await;
        Ok((state.entries.get(key).cloned(), Some(state.sequence)))
    }

    async fn fetch_all(&self, keys: &[K]) -> Result<HashMap<K, V>, RemoteError> {
        self.check_available()?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| state.entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn subscribe_invalidations(
        &self,
        map_name: &str,
    ) -> Result<InvalidationStream<K>, RemoteError> {
        self.check_available().map_err(|e| RemoteError::Subscription(e.to_string()))?;
        if map_name != self.name {
            return Err(RemoteError::Subscription(format!(
                "no map named '{}' (this is '{}')",
                map_name, self.name
            )));
        }
        Ok(self.invalidations.lock().subscribe())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InvalidationTarget;

    #[tokio::test]
    async fn test_put_and_fetch() {
        let remote: InMemoryRemoteMap<String, String> = InMemoryRemoteMap::new("map");
        remote.put("key".to_string(), "value".to_string()).await;

        let value = remote.fetch(&"key".to_string()).await.unwrap();
        assert_eq!(value, Some("value".to_string()));
        assert_eq!(remote.fetch(&"missing".to_string()).await.unwrap(), None);
        assert_eq!(remote.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_sequenced_tracks_mutations() {
        let remote: InMemoryRemoteMap<String, u64> = InMemoryRemoteMap::new("map");
        remote.put("a".to_string(), 1).await;
        remote.put("b".to_string(), 2).await;

        let (value, sequence) = remote.fetch_sequenced(&"a".to_string()).await.unwrap();
        assert_eq!(value, Some(1));
        assert_eq!(sequence, Some(2));
    }

    #[tokio::test]
    async fn test_fetch_all_skips_missing() {
        let remote: InMemoryRemoteMap<u64, u64> = InMemoryRemoteMap::new("map");
        remote.put(1, 10).await;
        remote.put(2, 20).await;

        let found = remote.fetch_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get(&2), Some(&20));
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_mutations_publish_invalidations() {
        let remote: InMemoryRemoteMap<String, String> = InMemoryRemoteMap::new("map");
        let mut stream = remote.subscribe_invalidations("map").await.unwrap();

        remote.put("key".to_string(), "v".to_string()).await;
        remote.remove(&"key".to_string()).await;
        remote.remove(&"never-there".to_string()).await;
        remote.clear().await;

        assert_eq!(
            stream.recv().await.unwrap(),
            Invalidation::key("key".to_string(), Some(1))
        );
        assert_eq!(
            stream.recv().await.unwrap(),
            Invalidation::key("key".to_string(), Some(2))
        );
        let cleared = stream.recv().await.unwrap();
        assert_eq!(cleared.target, InvalidationTarget::All);
        assert_eq!(cleared.sequence, Some(3));
    }

    #[tokio::test]
    async fn test_subscribe_wrong_name() {
        let remote: InMemoryRemoteMap<String, String> = InMemoryRemoteMap::new("map");
        let result = remote.subscribe_invalidations("other").await;
        assert!(matches!(result, Err(RemoteError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let remote: InMemoryRemoteMap<String, String> = InMemoryRemoteMap::new("map");
        remote.set_unavailable(true);

        let result = remote.fetch(&"key".to_string()).await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert!(remote.subscribe_invalidations("map").await.is_err());

        remote.set_unavailable(false);
        assert!(remote.fetch(&"key".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_closes_streams() {
        let remote: InMemoryRemoteMap<String, String> = InMemoryRemoteMap::new("map");
        let mut stream = remote.subscribe_invalidations("map").await.unwrap();

        remote.disconnect_subscribers();

        assert!(matches!(
            stream.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
