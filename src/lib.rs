//! Near Cache - A client-side read cache in front of a remote map
//!
//! Keeps recently read entries local, bounded by approximate-LRU eviction,
//! aged out by TTL and idle expiry, and dropped when the remote copy changes.

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod near_cache;
pub mod remote;
pub mod tasks;

pub use cache::{CacheLookup, NearCacheStatsSnapshot};
pub use config::{InMemoryFormat, NearCacheConfig};
pub use error::{CacheError, Result};
pub use key::MapKey;
pub use near_cache::{CacheState, NearCache};
pub use remote::{InMemoryRemoteMap, Invalidation, InvalidationTarget, RemoteError, RemoteMap};
