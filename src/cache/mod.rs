//! Cache Module
//!
//! Provides the near cache storage engine: records, the concurrent store,
//! approximate-LRU eviction, TTL/idle expiry and statistics.

mod eviction;
mod expiry;
mod record;
mod stats;
mod store;


// Re-export public types
pub use eviction::EvictionPolicy;
pub use expiry::ExpiryPolicy;
pub use record::{
    monotonic_millis, CacheLookup, CachedValue, MapValue, Record, StoredValue,
};
pub use stats::{NearCacheStats, NearCacheStatsSnapshot};
pub use store::NearCacheStore;
