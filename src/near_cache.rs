//! Near Cache Module
//!
//! The public face of the near cache: keyed reads and writes against the
//! local store, fetch-through reads against the remote map, statistics, and
//! the lifecycle of the background tasks.
//!
//! # Lifecycle
//! `Created -> Running -> Destroyed`. Keyed operations work in `Created`
//! and `Running`; after [`NearCache::destroy`] they fail fast with
//! [`CacheError::Destroyed`]. [`NearCache::stats`] keeps working.
//!
//! # Consistency
//! Invalidation is asynchronous. After a remote change there is a window in
//! which `get` and `contains_key` may still see the old record.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    monotonic_millis, CacheLookup, CachedValue, EvictionPolicy, ExpiryPolicy, MapValue,
    NearCacheStats, NearCacheStatsSnapshot, NearCacheStore, Record, StoredValue,
};
use crate::config::NearCacheConfig;
use crate::error::{CacheError, Result};
use crate::key::MapKey;
use crate::remote::RemoteMap;
use crate::tasks::{spawn_expiry_task, spawn_invalidation_task};

// == Cache State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheState {
    /// Built, background tasks not started
    Created,
    /// Background tasks active
    Running,
    /// Terminal; store emptied and tasks stopped
    Destroyed,
}

// == Near Cache ==
/// Client-local read cache in front of a remote map.
pub struct NearCache<K: MapKey, V: MapValue> {
    name: String,
    config: NearCacheConfig,
    store: Arc<NearCacheStore<K, V>>,
    stats: Arc<NearCacheStats>,
    expiry: ExpiryPolicy,
    remote: Option<Arc<dyn RemoteMap<K, V>>>,
    state: watch::Sender<CacheState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: MapKey, V: MapValue> NearCache<K, V> {
    // == Constructors ==
    /// Creates a standalone near cache. Fetch-through reads are unavailable
    /// and no invalidation listener will run.
    pub fn new(name: impl Into<String>, config: NearCacheConfig) -> Result<Self> {
        Self::build(name.into(), config, None)
    }

    /// Creates a near cache in front of `remote`.
    pub fn with_remote(
        name: impl Into<String>,
        config: NearCacheConfig,
        remote: Arc<dyn RemoteMap<K, V>>,
    ) -> Result<Self> {
        Self::build(name.into(), config, Some(remote))
    }

    fn build(
        name: String,
        config: NearCacheConfig,
        remote: Option<Arc<dyn RemoteMap<K, V>>>,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(NearCacheStats::new());
        let store = Arc::new(NearCacheStore::new(
            config.max_size,
            EvictionPolicy::from_config(&config),
            Arc::clone(&stats),
        ));
        let (state, _) = watch::channel(CacheState::Created);

        Ok(Self {
            name,
            expiry: ExpiryPolicy::from_config(&config),
            config,
            store,
            stats,
            remote,
            state,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    pub fn state(&self) -> CacheState {
        *self.state.borrow()
    }

    // == Start ==
    /// Starts the expiry sweeper and, when `invalidate_on_change` is set and
    /// a remote map is attached, the invalidation listener. Records already
    /// cached are dropped once the listener has subscribed.
    ///
    /// Must be called from within a tokio runtime. Starting a running cache
    /// is a no-op.
    pub fn start(&self) -> Result<()> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| CacheError::Runtime(format!("no tokio runtime: {}", e)))?;

        let mut tasks = self.tasks.lock();
        let started = self.state.send_if_modified(|state| {
            if *state == CacheState::Created {
                *state = CacheState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return match self.state() {
                CacheState::Destroyed => Err(CacheError::Destroyed(self.name.clone())),
                _ => Ok(()),
            };
        }

        tasks.push(spawn_expiry_task(
            self.name.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            self.expiry,
            self.config.cleanup_interval(),
            self.state.subscribe(),
        ));

        if self.config.invalidate_on_change {
            match &self.remote {
                Some(remote) => tasks.push(spawn_invalidation_task(
                    self.name.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.stats),
                    Arc::clone(remote),
                    self.config.cleanup_interval(),
                    self.state.subscribe(),
                )),
                None => debug!(
                    "Near cache '{}' has no remote map, invalidation listener not started",
                    self.name
                ),
            }
        }

        info!("Near cache '{}' started with {} background tasks", self.name, tasks.len());
        Ok(())
    }

    // == Destroy ==
    /// Stops the background tasks, waits for their current pass to finish,
    /// and empties the store. Idempotent.
    pub async fn destroy(&self) {
        let previous = self.state.send_replace(CacheState::Destroyed);
        if previous == CacheState::Destroyed {
            return;
        }

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Near cache '{}' background task ended abnormally: {}", self.name, e);
            }
        }

        let cleared = self.store.clear();
        info!("Near cache '{}' destroyed, {} records dropped", self.name, cleared);
    }

    fn check_key(&self, key: &K) -> Result<()> {
        if key.is_null() {
            return Err(CacheError::InvalidArgument(
                "null key is not allowed".to_string(),
            ));
        }
        self.check_open()
    }

    fn check_open(&self) -> Result<()> {
        if self.state() == CacheState::Destroyed {
            return Err(CacheError::Destroyed(self.name.clone()));
        }
        Ok(())
    }

    /// Returns the live record for `key`, removing it first if expired.
    fn live_record(&self, key: &K) -> Option<Arc<Record<V>>> {
        let record = self.store.get(key)?;
        if self.expiry.is_expired(&record, monotonic_millis()) {
            if self.store.remove_record(key, &record) {
                self.stats.record_expirations(1);
            }
            return None;
        }
        Some(record)
    }

    // == Get ==
    /// Looks up `key` in the local store.
    ///
    /// A live record holding a value is a hit. A live confirmed-absent
    /// record is returned as [`CacheLookup::ConfirmedAbsent`] and counted as
    /// a miss. Expired records are removed and reported as a miss.
    pub fn get(&self, key: &K) -> Result<CacheLookup<V>> {
        self.check_key(key)?;

        let Some(record) = self.live_record(key) else {
            self.stats.record_miss();
            return Ok(CacheLookup::Miss);
        };

        self.store.touch(&record);
        match record.value() {
            CachedValue::Present(stored) => {
                let value = stored.decode()?;
                self.stats.record_hit();
                Ok(CacheLookup::Hit(value))
            }
            CachedValue::ConfirmedAbsent => {
                self.stats.record_miss();
                Ok(CacheLookup::ConfirmedAbsent)
            }
        }
    }

    // == Put ==
    /// Caches the remote view of `key`. `None` records that the remote
    /// store has no such key.
    pub fn put(&self, key: K, value: Option<V>) -> Result<()> {
        self.put_with_sequence(key, value, None)
    }

    /// Caches the remote view of `key` as of remote state `sequence`.
    pub fn put_with_sequence(&self, key: K, value: Option<V>, sequence: Option<u64>) -> Result<()> {
        self.check_key(&key)?;

        let cached = match value {
            Some(value) => {
                CachedValue::Present(StoredValue::encode(value, self.config.in_memory_format)?)
            }
            None => CachedValue::ConfirmedAbsent,
        };
        self.store.put(key, Record::new(cached, sequence));
        Ok(())
    }

    // == Remove ==
    /// Drops the local record for `key`. Returns false if nothing was cached.
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.check_key(key)?;
        Ok(self.store.remove(key))
    }

    /// Drops the local record for `key` because the remote copy changed.
    /// Counted as an invalidation.
    pub fn invalidate(&self, key: &K) -> Result<bool> {
        self.check_key(key)?;
        let removed = self.store.remove(key);
        if removed {
            self.stats.record_invalidations(1);
        }
        Ok(removed)
    }

    // == Contains Key ==
    /// Returns true if a live record holding a value is cached for `key`.
    ///
    /// Confirmed-absent records report false. Does not count as a hit or miss.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        self.check_key(key)?;
        Ok(self
            .live_record(key)
            .map(|record| !record.value().is_absent())
            .unwrap_or(false))
    }

    // == Clear ==
    /// Drops every local record. Returns how many were dropped.
    pub fn clear(&self) -> Result<usize> {
        self.check_open()?;
        Ok(self.store.clear())
    }

    // == Stats ==
    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> NearCacheStatsSnapshot {
        self.stats
            .snapshot(self.store.len(), self.store.memory_cost())
    }

    /// Zeroes the cumulative counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn remote(&self) -> Result<&Arc<dyn RemoteMap<K, V>>> {
        self.remote.as_ref().ok_or(CacheError::NoRemote)
    }

    // == Fetch ==
    /// Reads `key` through the near cache.
    ///
    /// On a miss the remote map is read and the result, including a
    /// confirmed absence, is cached before returning. The cached record
    /// becomes visible only once the remote read has completed. Remote
    /// failures are returned unchanged and nothing is cached.
    pub async fn fetch(&self, key: &K) -> Result<Option<V>> {
        if let Some(cached) = self.get(key)?.cached() {
            return Ok(cached);
        }

        let (value, sequence) = self.remote()?.fetch_sequenced(key).await?;
        self.put_with_sequence(key.clone(), value.clone(), sequence)?;
        Ok(value)
    }

    // == Fetch All ==
    /// Reads `keys` through the near cache with at most one remote call.
    ///
    /// Keys the remote map does not return are cached as confirmed absent
    /// and left out of the result.
    pub async fn fetch_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            match self.get(key)? {
                CacheLookup::Hit(value) => {
                    found.insert(key.clone(), value);
                }
                CacheLookup::ConfirmedAbsent => {}
                CacheLookup::Miss => missing.push(key.clone()),
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        let fetched = self.remote()?.fetch_all(&missing).await?;
        for key in missing {
            let value = fetched.get(&key).cloned();
            self.put(key.clone(), value.clone())?;
            if let Some(value) = value {
                found.insert(key, value);
            }
        }
        Ok(found)
    }
}
