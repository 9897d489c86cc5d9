//! Cache Statistics Module
//!
//! Tracks near cache metrics including hits, misses, evictions, expirations
//! and invalidations. Counters are atomic so every actor sharing the store
//! can record without locking.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Stats Recorder ==
/// Live counters owned by a near cache.
#[derive(Debug)]
pub struct NearCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    creation_time: DateTime<Utc>,
}

impl NearCacheStats {
    // == Constructor ==
    /// Creates a recorder with all counters at zero.
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            creation_time: Utc::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    // == Reset ==
    /// Zeroes the cumulative counters. Resident entries are untouched.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters, pairing them with the current resident count.
    pub fn snapshot(&self, owned_entry_count: usize, owned_entry_memory: usize) -> NearCacheStatsSnapshot {
        NearCacheStatsSnapshot {
            owned_entry_count,
            owned_entry_memory,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            creation_time: self.creation_time,
        }
    }
}

impl Default for NearCacheStats {
    fn default() -> Self {
        Self::new()
    }
}

// == Stats Snapshot ==
/// Read-only copy of the near cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearCacheStatsSnapshot {
    /// Entries currently resident in the local store
    pub owned_entry_count: usize,
    /// Approximate bytes held by resident payloads
    pub owned_entry_memory: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub creation_time: DateTime<Utc>,
}

impl NearCacheStatsSnapshot {
    // == Hit Ratio ==
    /// Returns hits / (hits + misses), or 0.0 if nothing has been read.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
