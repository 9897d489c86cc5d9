//! Error types for the near cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::remote::RemoteError;

// == Cache Error Enum ==
/// Unified error type for the near cache.
///
/// A normal miss is never an error; it is reported through
/// [`CacheLookup::Miss`](crate::cache::CacheLookup::Miss).
#[derive(Error, Debug)]
pub enum CacheError {
    /// The reserved null key marker was passed to a keyed operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted after the near cache was destroyed
    #[error("Near cache destroyed: {0}")]
    Destroyed(String),

    /// Background tasks could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Fetch-through operation on a cache without a remote map
    #[error("No remote map attached to this near cache")]
    NoRemote,

    /// Failure reported by the remote map, propagated unchanged
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Value could not be encoded or decoded for binary storage
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the near cache.
pub type Result<T> = std::result::Result<T, CacheError>;
