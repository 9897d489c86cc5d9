//! Cache Store Module
//!
//! Concurrent key -> record storage. Backed by a sharded map so that reads
//! on different keys never serialize behind one lock. Removal of a record is
//! atomic with respect to lookup of the same key.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::cache::{
    monotonic_millis, CachedValue, EvictionPolicy, ExpiryPolicy, NearCacheStats, Record,
};
use crate::key::MapKey;

// == Near Cache Store ==
/// Shared storage for records, with size-triggered eviction.
#[derive(Debug)]
pub struct NearCacheStore<K: MapKey, V> {
    /// Key -> record storage
    entries: DashMap<K, Arc<Record<V>>>,
    /// Configured upper bound on entry count
    max_size: usize,
    eviction: EvictionPolicy,
    stats: Arc<NearCacheStats>,
    /// Source of access ticks
    clock: AtomicU64,
    /// Set while one caller runs an eviction pass
    evicting: AtomicBool,
}

impl<K: MapKey, V> NearCacheStore<K, V> {
    // == Constructor ==
    pub fn new(max_size: usize, eviction: EvictionPolicy, stats: Arc<NearCacheStats>) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
            eviction,
            stats,
            clock: AtomicU64::new(0),
            evicting: AtomicBool::new(false),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    // == Get ==
    /// Returns the record for `key`, if present. Does not update recency.
    pub fn get(&self, key: &K) -> Option<Arc<Record<V>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    // == Touch ==
    /// Marks `record` as read now.
    pub fn touch(&self, record: &Record<V>) {
        record.touch(monotonic_millis(), self.next_tick());
    }

    // == Put ==
    /// Inserts or replaces the record for `key`; last write wins.
    ///
    /// Runs an eviction pass if the store grew past its bound. The record
    /// just inserted is never chosen by that pass.
    ///
    /// Returns true if any record was evicted.
    pub fn put(&self, key: K, record: Record<V>) -> bool {
        record.set_access_tick(self.next_tick());
        self.entries.insert(key.clone(), Arc::new(record));

        if self.entries.len() > self.max_size {
            self.evict(&key) > 0
        } else {
            false
        }
    }

    // == Remove ==
    /// Removes the record for `key`. Returns false if nothing was cached.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes `key` only if it still maps to `record`, so a concurrent
    /// replacement is never dropped by mistake.
    pub fn remove_record(&self, key: &K, record: &Arc<Record<V>>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, record))
            .is_some()
    }

    /// Removes `key` unless its record already reflects remote state at or
    /// after `sequence`.
    pub fn remove_unless_newer(&self, key: &K, sequence: Option<u64>) -> bool {
        self.entries
            .remove_if(key, |_, current| !current.is_newer_than(sequence))
            .is_some()
    }

    // == Clear ==
    /// Removes every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    // == Remove Expired ==
    /// Removes every record expired at `now`. Returns the number removed.
    ///
    /// Locks one shard at a time.
    pub fn remove_expired(&self, policy: &ExpiryPolicy, now: u64) -> usize {
        if policy.is_disabled() {
            return 0;
        }
        let mut removed = 0;
        self.entries.retain(|_, record| {
            if policy.is_expired(record, now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    // == Evict ==
    /// Drops the coldest records until the store is back within bound.
    ///
    /// Only one caller evicts at a time. After releasing the flag the size is
    /// checked again, so a put that lost the race to a finishing evictor is
    /// still brought back within bound.
    fn evict(&self, protected: &K) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.max_size {
            if self
                .evicting
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // the running evictor re-checks once it releases the flag
                break;
            }

            let removed = self.evict_passes(protected);
            self.evicting.store(false, Ordering::Release);

            if removed == 0 {
                break;
            }
            evicted += removed;
        }

        if evicted > 0 {
            self.stats.record_evictions(evicted as u64);
            debug!("Eviction: removed {} records, {} remain", evicted, self.entries.len());
        }
        evicted
    }

    /// Runs eviction passes while holding the evicting flag.
    fn evict_passes(&self, protected: &K) -> usize {
        let mut evicted = 0;
        loop {
            let count = self.eviction.eviction_count(self.entries.len(), self.max_size);
            if count == 0 {
                break;
            }

            let candidates: Vec<(K, u64)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().access_tick()))
                .collect();

            let removed_this_pass = self
                .eviction
                .select_victims(candidates, count, protected)
                .into_iter()
                .filter(|key| self.entries.remove(key).is_some())
                .count();

            if removed_this_pass == 0 {
                break;
            }
            evicted += removed_this_pass;
        }
        evicted
    }

    // == Length ==
    /// Returns the current number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: MapKey, V: crate::cache::MapValue> NearCacheStore<K, V> {
    /// Approximate bytes held by resident payloads.
    pub fn memory_cost(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry.value().value() {
                CachedValue::Present(stored) => stored.memory_cost(),
                CachedValue::ConfirmedAbsent => 0,
            })
            .sum()
    }
}
