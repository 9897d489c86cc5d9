//! Cache Record Module
//!
//! Defines the value holder stored for each cached key. A record's value is
//! fixed at creation; updates replace the whole record. Only the access
//! bookkeeping changes after construction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::InMemoryFormat;
use crate::error::Result;

/// A value that can be held by a near cache.
pub trait MapValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> MapValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

// == Stored Value ==
/// Local representation of a cached payload.
#[derive(Debug, Clone)]
pub enum StoredValue<V> {
    /// Shared deserialized value
    Object(Arc<V>),
    /// Serialized copy
    Binary(Arc<[u8]>),
}

impl<V: MapValue> StoredValue<V> {
    /// Encodes `value` according to the configured in-memory format.
    pub fn encode(value: V, format: InMemoryFormat) -> Result<Self> {
        match format {
            InMemoryFormat::Object => Ok(StoredValue::Object(Arc::new(value))),
            InMemoryFormat::Binary => {
                let bytes = serde_json::to_vec(&value)?;
                Ok(StoredValue::Binary(bytes.into()))
            }
        }
    }

    /// Produces an owned value for the caller.
    pub fn decode(&self) -> Result<V> {
        match self {
            StoredValue::Object(value) => Ok((**value).clone()),
            StoredValue::Binary(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Approximate heap footprint of the payload in bytes.
    pub fn memory_cost(&self) -> usize {
        match self {
            StoredValue::Object(_) => std::mem::size_of::<V>(),
            StoredValue::Binary(bytes) => bytes.len(),
        }
    }
}

// == Cached Value ==
/// Either a cached payload or the marker recording that the remote store
/// confirmed the key does not exist.
#[derive(Debug, Clone)]
pub enum CachedValue<V> {
    Present(StoredValue<V>),
    ConfirmedAbsent,
}

impl<V> CachedValue<V> {
    pub fn is_absent(&self) -> bool {
        matches!(self, CachedValue::ConfirmedAbsent)
    }
}

// == Cache Lookup ==
/// Outcome of reading a key from the near cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    /// A live record holding a value
    Hit(V),
    /// A live record saying the remote store has no such key
    ConfirmedAbsent,
    /// Nothing cached; the caller should consult the remote store
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// Converts a cached outcome into the remote-store view, or `None` on a miss.
    pub fn cached(self) -> Option<Option<V>> {
        match self {
            CacheLookup::Hit(value) => Some(Some(value)),
            CacheLookup::ConfirmedAbsent => Some(None),
            CacheLookup::Miss => None,
        }
    }
}

// == Record ==
/// A single cached entry with its bookkeeping timestamps.
#[derive(Debug)]
pub struct Record<V> {
    value: CachedValue<V>,
    /// Creation time (monotonic milliseconds)
    created_at: u64,
    /// Last read time (monotonic milliseconds)
    last_accessed_at: AtomicU64,
    /// Recency tick used to order eviction candidates
    access_tick: AtomicU64,
    /// Sequence of the remote state this record was read from
    invalidation_sequence: Option<u64>,
}

impl<V> Record<V> {
    // == Constructor ==
    /// Creates a record stamped with the current time.
    pub fn new(value: CachedValue<V>, invalidation_sequence: Option<u64>) -> Self {
        let now = monotonic_millis();
        Self::with_timestamps(value, now, now, invalidation_sequence)
    }

    pub(crate) fn with_timestamps(
        value: CachedValue<V>,
        created_at: u64,
        last_accessed_at: u64,
        invalidation_sequence: Option<u64>,
    ) -> Self {
        Self {
            value,
            created_at,
            last_accessed_at: AtomicU64::new(last_accessed_at),
            access_tick: AtomicU64::new(0),
            invalidation_sequence,
        }
    }

    pub fn value(&self) -> &CachedValue<V> {
        &self.value
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> u64 {
        self.last_accessed_at.load(Ordering::Relaxed)
    }

    pub fn access_tick(&self) -> u64 {
        self.access_tick.load(Ordering::Relaxed)
    }

    pub fn invalidation_sequence(&self) -> Option<u64> {
        self.invalidation_sequence
    }

    // == Touch ==
    /// Records a read of this entry.
    pub fn touch(&self, now: u64, tick: u64) {
        self.last_accessed_at.fetch_max(now, Ordering::Relaxed);
        self.access_tick.fetch_max(tick, Ordering::Relaxed);
    }

    pub(crate) fn set_access_tick(&self, tick: u64) {
        self.access_tick.store(tick, Ordering::Relaxed);
    }

    // == Staleness ==
    /// Returns true if an invalidation carrying `sequence` is older than, or
    /// equal to, the remote state this record already reflects.
    pub fn is_newer_than(&self, sequence: Option<u64>) -> bool {
        match (self.invalidation_sequence, sequence) {
            (Some(own), Some(incoming)) => incoming <= own,
            _ => false,
        }
    }
}

// == Utility Functions ==
/// Returns milliseconds elapsed on a process-wide monotonic clock.
pub fn monotonic_millis() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
