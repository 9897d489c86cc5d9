//! Expiry Policy Module
//!
//! Decides whether a record has outlived its time-to-live or its maximum
//! idle time. Used both by lazy checks on read and by the background sweeper.

use std::time::Duration;

use crate::cache::Record;
use crate::config::NearCacheConfig;

// == Expiry Policy ==
/// TTL and idle limits in milliseconds, 0 = disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    time_to_live_ms: u64,
    max_idle_ms: u64,
}

impl ExpiryPolicy {
    pub fn new(time_to_live: Duration, max_idle: Duration) -> Self {
        Self {
            time_to_live_ms: saturating_millis(time_to_live),
            max_idle_ms: saturating_millis(max_idle),
        }
    }

    pub fn from_config(config: &NearCacheConfig) -> Self {
        Self::new(config.time_to_live(), config.max_idle())
    }

    /// Returns true if neither rule is enabled.
    pub fn is_disabled(&self) -> bool {
        self.time_to_live_ms == 0 && self.max_idle_ms == 0
    }

    // == Is Expired ==
    /// Checks a record against both rules at time `now`.
    ///
    /// Boundary condition: a record is expired once the elapsed time is
    /// greater than or equal to the limit. Either rule alone is sufficient.
    pub fn is_expired<V>(&self, record: &Record<V>, now: u64) -> bool {
        self.is_ttl_expired(record, now) || self.is_idle_expired(record, now)
    }

    fn is_ttl_expired<V>(&self, record: &Record<V>, now: u64) -> bool {
        self.time_to_live_ms > 0
            && now.saturating_sub(record.created_at()) >= self.time_to_live_ms
    }

    fn is_idle_expired<V>(&self, record: &Record<V>, now: u64) -> bool {
        self.max_idle_ms > 0
            && now.saturating_sub(record.last_accessed_at()) >= self.max_idle_ms
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedValue;

    fn record_at(created_at: u64, last_accessed_at: u64) -> Record<String> {
        Record::with_timestamps(CachedValue::ConfirmedAbsent, created_at, last_accessed_at, None)
    }

    #[test]
    fn test_disabled_policy_never_expires() {
        let policy = ExpiryPolicy::default();
        assert!(policy.is_disabled());
        assert!(!policy.is_expired(&record_at(0, 0), u64::MAX));
    }

    #[test]
    fn test_ttl_expiry() {
        let policy = ExpiryPolicy::new(Duration::from_secs(3), Duration::ZERO);
        let record = record_at(1_000, 1_000);

        assert!(!policy.is_expired(&record, 3_999));
        assert!(policy.is_expired(&record, 4_000), "expired at boundary");
        assert!(policy.is_expired(&record, 10_000));
    }

    #[test]
    fn test_ttl_ignores_access() {
        let policy = ExpiryPolicy::new(Duration::from_secs(1), Duration::ZERO);
        let record = record_at(0, 0);
        record.touch(999, 1);

        assert!(policy.is_expired(&record, 1_000));
    }

    #[test]
    fn test_idle_expiry() {
        let policy = ExpiryPolicy::new(Duration::ZERO, Duration::from_secs(1));
        let record = record_at(0, 0);

        assert!(!policy.is_expired(&record, 999));
        assert!(policy.is_expired(&record, 1_000));
    }

    #[test]
    fn test_access_resets_idle_clock() {
        let policy = ExpiryPolicy::new(Duration::ZERO, Duration::from_secs(1));
        let record = record_at(0, 0);
        record.touch(800, 1);

        assert!(!policy.is_expired(&record, 1_500));
        assert!(policy.is_expired(&record, 1_800));
    }

    #[test]
    fn test_either_rule_is_sufficient() {
        let policy = ExpiryPolicy::new(Duration::from_secs(10), Duration::from_secs(1));
        let record = record_at(0, 0);

        // idle fires long before ttl
        assert!(policy.is_expired(&record, 1_000));

        record.touch(9_500, 2);
        // ttl fires even though the record was just read
        assert!(policy.is_expired(&record, 10_000));
    }

    #[test]
    fn test_huge_limits_saturate() {
        let config = NearCacheConfig::default()
            .with_time_to_live_seconds(u64::MAX)
            .with_max_idle_seconds(u64::MAX / 100);
        let policy = ExpiryPolicy::from_config(&config);

        assert_eq!(policy, ExpiryPolicy::new(Duration::MAX, Duration::MAX));
        assert!(!policy.is_disabled());
        assert!(!policy.is_expired(&record_at(0, 0), 1_000_000));
    }

    #[test]
    fn test_from_config() {
        let config = NearCacheConfig::default()
            .with_time_to_live_seconds(3)
            .with_max_idle_seconds(1);
        let policy = ExpiryPolicy::from_config(&config);

        assert_eq!(policy, ExpiryPolicy::new(Duration::from_secs(3), Duration::from_secs(1)));
        assert!(!policy.is_disabled());
    }
}
