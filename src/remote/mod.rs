//! Remote Map Module
//!
//! The near cache sits in front of an authoritative remote map. This module
//! defines what it needs from that map: reads, and a stream of change
//! notifications used to invalidate local records.

mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cache::MapValue;
use crate::key::MapKey;

pub use memory::InMemoryRemoteMap;

// == Remote Error ==
/// Failure reported by the remote map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote store could not serve the request
    #[error("Remote map unavailable: {0}")]
    Unavailable(String),

    /// Change notifications could not be subscribed to
    #[error("Invalidation subscription failed: {0}")]
    Subscription(String),
}

// == Invalidation ==
/// What a change notification refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget<K> {
    /// A single key was put or removed remotely
    Key(K),
    /// The whole map was cleared or destroyed
    All,
}

/// A change notification pushed by the remote map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation<K> {
    pub target: InvalidationTarget<K>,
    /// Monotonic token of the remote state after the change, if supplied
    pub sequence: Option<u64>,
}

impl<K> Invalidation<K> {
    pub fn key(key: K, sequence: Option<u64>) -> Self {
        Self {
            target: InvalidationTarget::Key(key),
            sequence,
        }
    }

    pub fn all(sequence: Option<u64>) -> Self {
        Self {
            target: InvalidationTarget::All,
            sequence,
        }
    }
}

/// Receiving side of a change notification subscription.
pub type InvalidationStream<K> = broadcast::Receiver<Invalidation<K>>;

// == Remote Map ==
/// Capabilities the near cache consumes from the remote map client.
#[async_trait]
pub trait RemoteMap<K: MapKey, V: MapValue>: Send + Sync {
    /// Reads one key. `None` means the remote store has no such key.
    async fn fetch(&self, key: &K) -> Result<Option<V>, RemoteError>;

    /// Reads one key together with the sequence of the state it was read at.
    async fn fetch_sequenced(&self, key: &K) -> Result<(Option<V>, Option<u64>), RemoteError> {
        Ok((self.fetch(key).await?, None))
    }

    /// Reads several keys. Keys absent remotely are left out of the result.
    ///
    /// Default implementation falls back to sequential fetches.
    async fn fetch_all(&self, keys: &[K]) -> Result<HashMap<K, V>, RemoteError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.fetch(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Subscribes to change notifications for the map named `map_name`.
    async fn subscribe_invalidations(
        &self,
        map_name: &str,
    ) -> Result<InvalidationStream<K>, RemoteError>;
}
