//! Configuration Module
//!
//! Handles loading and validating near cache configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default maximum number of entries.
pub const DEFAULT_MAX_SIZE: usize = 10_000;
/// Default fraction of capacity removed per eviction pass.
pub const DEFAULT_EVICTION_PERCENTAGE: f64 = 0.20;
/// Default period of the expiry sweeper.
pub const DEFAULT_CLEANUP_INTERVAL_MILLIS: u64 = 5_000;

// == In Memory Format ==
/// How cached values are held in local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InMemoryFormat {
    /// Serialized copy, decoded into a fresh value on every read.
    #[default]
    Binary,
    /// Shared value, cloned on every read.
    Object,
}

impl FromStr for InMemoryFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(InMemoryFormat::Binary),
            "object" => Ok(InMemoryFormat::Object),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown in-memory format: {}",
                other
            ))),
        }
    }
}

/// Near cache configuration parameters.
///
/// Immutable once handed to a [`NearCache`](crate::NearCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearCacheConfig {
    /// Entry-count bound triggering eviction
    pub max_size: usize,
    /// Maximum record age in seconds, 0 disables
    pub time_to_live_seconds: u64,
    /// Maximum time since last access in seconds, 0 disables
    pub max_idle_seconds: u64,
    /// Whether the invalidation listener runs
    pub invalidate_on_change: bool,
    /// Fraction of capacity removed per eviction pass
    pub eviction_percentage: f64,
    /// Period of the expiry sweeper in milliseconds
    pub cleanup_interval_millis: u64,
    /// Storage representation of cached values
    pub in_memory_format: InMemoryFormat,
}

impl NearCacheConfig {
    /// Creates a new config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `NEAR_CACHE_MAX_SIZE` (default: 10000)
    /// - `NEAR_CACHE_TTL_SECONDS` (default: 0)
    /// - `NEAR_CACHE_MAX_IDLE_SECONDS` (default: 0)
    /// - `NEAR_CACHE_INVALIDATE_ON_CHANGE` (default: true)
    /// - `NEAR_CACHE_EVICTION_PERCENTAGE` (default: 0.20)
    /// - `NEAR_CACHE_CLEANUP_INTERVAL_MILLIS` (default: 5000)
    /// - `NEAR_CACHE_IN_MEMORY_FORMAT` (default: binary)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_or("NEAR_CACHE_MAX_SIZE", defaults.max_size),
            time_to_live_seconds: env_or("NEAR_CACHE_TTL_SECONDS", defaults.time_to_live_seconds),
            max_idle_seconds: env_or("NEAR_CACHE_MAX_IDLE_SECONDS", defaults.max_idle_seconds),
            invalidate_on_change: env_or(
                "NEAR_CACHE_INVALIDATE_ON_CHANGE",
                defaults.invalidate_on_change,
            ),
            eviction_percentage: env_or(
                "NEAR_CACHE_EVICTION_PERCENTAGE",
                defaults.eviction_percentage,
            ),
            cleanup_interval_millis: env_or(
                "NEAR_CACHE_CLEANUP_INTERVAL_MILLIS",
                defaults.cleanup_interval_millis,
            ),
            in_memory_format: env_or("NEAR_CACHE_IN_MEMORY_FORMAT", defaults.in_memory_format),
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_time_to_live_seconds(mut self, seconds: u64) -> Self {
        self.time_to_live_seconds = seconds;
        self
    }

    pub fn with_max_idle_seconds(mut self, seconds: u64) -> Self {
        self.max_idle_seconds = seconds;
        self
    }

    pub fn with_invalidate_on_change(mut self, enabled: bool) -> Self {
        self.invalidate_on_change = enabled;
        self
    }

    pub fn with_eviction_percentage(mut self, percentage: f64) -> Self {
        self.eviction_percentage = percentage;
        self
    }

    pub fn with_cleanup_interval_millis(mut self, millis: u64) -> Self {
        self.cleanup_interval_millis = millis;
        self
    }

    pub fn with_in_memory_format(mut self, format: InMemoryFormat) -> Self {
        self.in_memory_format = format;
        self
    }

    // == Validate ==
    /// Checks that the configuration can drive a near cache.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.eviction_percentage) {
            return Err(CacheError::InvalidConfig(format!(
                "eviction_percentage must be within [0.0, 1.0], got {}",
                self.eviction_percentage
            )));
        }
        if self.cleanup_interval_millis == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval_millis must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_to_live(&self) -> Duration {
        Duration::from_secs(self.time_to_live_seconds)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_millis)
    }
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            time_to_live_seconds: 0,
            max_idle_seconds: 0,
            invalidate_on_change: true,
            eviction_percentage: DEFAULT_EVICTION_PERCENTAGE,
            cleanup_interval_millis: DEFAULT_CLEANUP_INTERVAL_MILLIS,
            in_memory_format: InMemoryFormat::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = NearCacheConfig::default();
        assert_eq!(config.max_size, 10_000);
        assert_eq!(config.time_to_live_seconds, 0);
        assert_eq!(config.max_idle_seconds, 0);
        assert!(config.invalidate_on_change);
        assert_eq!(config.eviction_percentage, 0.20);
        assert_eq!(config.cleanup_interval_millis, 5_000);
        assert_eq!(config.in_memory_format, InMemoryFormat::Binary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        env::remove_var("NEAR_CACHE_MAX_SIZE");
        env::remove_var("NEAR_CACHE_TTL_SECONDS");
        env::remove_var("NEAR_CACHE_MAX_IDLE_SECONDS");
        env::remove_var("NEAR_CACHE_INVALIDATE_ON_CHANGE");
        env::remove_var("NEAR_CACHE_EVICTION_PERCENTAGE");
        env::remove_var("NEAR_CACHE_CLEANUP_INTERVAL_MILLIS");
        env::remove_var("NEAR_CACHE_IN_MEMORY_FORMAT");

        assert_eq!(NearCacheConfig::from_env(), NearCacheConfig::default());
    }

    #[test]
    fn test_builder_setters() {
        let config = NearCacheConfig::default()
            .with_max_size(100)
            .with_time_to_live_seconds(3)
            .with_max_idle_seconds(1)
            .with_invalidate_on_change(false)
            .with_eviction_percentage(0.5)
            .with_cleanup_interval_millis(250)
            .with_in_memory_format(InMemoryFormat::Object);

        assert_eq!(config.max_size, 100);
        assert_eq!(config.time_to_live(), Duration::from_secs(3));
        assert_eq!(config.max_idle(), Duration::from_secs(1));
        assert!(!config.invalidate_on_change);
        assert_eq!(config.eviction_percentage, 0.5);
        assert_eq!(config.cleanup_interval(), Duration::from_millis(250));
        assert_eq!(config.in_memory_format, InMemoryFormat::Object);
    }

    #[test]
    fn test_validate_rejects_zero_max_size() {
        let result = NearCacheConfig::default().with_max_size(0).validate();
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_percentage() {
        let config = NearCacheConfig::default().with_eviction_percentage(1.5);
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));

        let config = NearCacheConfig::default().with_eviction_percentage(-0.1);
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_cleanup_interval() {
        let config = NearCacheConfig::default().with_cleanup_interval_millis(0);
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_in_memory_format_parse() {
        assert_eq!("binary".parse::<InMemoryFormat>().unwrap(), InMemoryFormat::Binary);
        assert_eq!("OBJECT".parse::<InMemoryFormat>().unwrap(), InMemoryFormat::Object);
        assert!("native".parse::<InMemoryFormat>().is_err());
    }
}
