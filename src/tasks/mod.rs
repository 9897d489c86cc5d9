//! Background Tasks Module
//!
//! Long-lived tasks owned by a near cache instance. Both are started by
//! [`NearCache::start`](crate::NearCache::start) and stopped by
//! [`NearCache::destroy`](crate::NearCache::destroy).
//!
//! # Tasks
//! - Expiry sweeper: removes TTL/idle-expired records at a fixed interval
//! - Invalidation listener: applies remote change notifications

mod expiry;
mod invalidation;

use tokio::sync::watch;

use crate::near_cache::CacheState;

pub use expiry::{spawn_expiry_task, sweep_expired};
pub use invalidation::{apply_invalidation, spawn_invalidation_task};

/// Resolves once the cache is destroyed or its owner is gone.
pub(crate) async fn wait_for_destroy(state: &mut watch::Receiver<CacheState>) {
    let _ = state.wait_for(|s| *s == CacheState::Destroyed).await;
}
