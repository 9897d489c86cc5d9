//! Eviction Policy Module
//!
//! Size-triggered eviction with approximate least-recently-used ordering.
//!
//! Records carry an access tick instead of living in an ordered list, so
//! reads never contend on a shared recency structure. When the store grows
//! past its bound, the coldest ticks are selected in a single pass.

use crate::config::NearCacheConfig;

/// Float slack applied before rounding the per-pass count up, so that
/// products such as `100 * 0.07` do not round to one entry too many.
const PERCENTAGE_EPSILON: f64 = 1e-9;

// == Eviction Policy ==
/// Decides how many and which records to drop when the store is oversized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    /// Fraction of capacity removed per pass
    eviction_percentage: f64,
}

impl EvictionPolicy {
    // == Constructor ==
    pub fn new(eviction_percentage: f64) -> Self {
        Self {
            eviction_percentage: eviction_percentage.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &NearCacheConfig) -> Self {
        Self::new(config.eviction_percentage)
    }

    // == Per Pass ==
    /// Returns `ceil(max_size * eviction_percentage)`.
    pub fn per_pass(&self, max_size: usize) -> usize {
        let raw = max_size as f64 * self.eviction_percentage;
        (raw - PERCENTAGE_EPSILON).ceil().max(0.0) as usize
    }

    // == Eviction Count ==
    /// Number of records to remove from a store holding `size` records.
    ///
    /// Brings the store down to `max_size - per_pass(max_size)`, but never
    /// removes the last remaining record.
    pub fn eviction_count(&self, size: usize, max_size: usize) -> usize {
        if size <= max_size {
            return 0;
        }
        let target = max_size.saturating_sub(self.per_pass(max_size));
        (size - target).min(size - 1)
    }

    // == Select Victims ==
    /// Picks the `count` coldest candidates, never choosing `protected`.
    ///
    /// Candidates are `(key, access_tick)` pairs; a lower tick is colder.
    pub fn select_victims<K: PartialEq>(
        &self,
        candidates: Vec<(K, u64)>,
        count: usize,
        protected: &K,
    ) -> Vec<K> {
        if count == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<(K, u64)> = candidates
            .into_iter()
            .filter(|(key, _)| key != protected)
            .collect();

        if count < candidates.len() {
            candidates.select_nth_unstable_by_key(count - 1, |(_, tick)| *tick);
            candidates.truncate(count);
        }

        candidates.into_iter().map(|(key, _)| key).collect()
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVICTION_PERCENTAGE)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(keys: &[(&'static str, u64)]) -> Vec<(&'static str, u64)> {
        keys.to_vec()
    }

    #[test]
    fn test_per_pass_rounds_up() {
        let policy = EvictionPolicy::new(0.20);
        assert_eq!(policy.per_pass(100), 20);
        assert_eq!(policy.per_pass(3), 1);
        assert_eq!(policy.per_pass(1), 1);

        assert_eq!(EvictionPolicy::new(0.07).per_pass(100), 7);
        assert_eq!(EvictionPolicy::new(0.0).per_pass(100), 0);
    }

    #[test]
    fn test_no_eviction_within_bound() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.eviction_count(0, 100), 0);
        assert_eq!(policy.eviction_count(100, 100), 0);
    }

    #[test]
    fn test_eviction_count_reaches_target() {
        let policy = EvictionPolicy::new(0.20);
        // 101 resident, target 80
        assert_eq!(policy.eviction_count(101, 100), 21);
    }

    #[test]
    fn test_zero_percentage_restores_bound() {
        let policy = EvictionPolicy::new(0.0);
        assert_eq!(policy.eviction_count(101, 100), 1);
    }

    #[test]
    fn test_full_percentage_keeps_one() {
        let policy = EvictionPolicy::new(1.0);
        assert_eq!(policy.eviction_count(11, 10), 10);

        let policy = EvictionPolicy::new(0.5);
        assert_eq!(policy.eviction_count(2, 1), 1);
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(EvictionPolicy::new(3.0), EvictionPolicy::new(1.0));
        assert_eq!(EvictionPolicy::new(-1.0), EvictionPolicy::new(0.0));
    }

    #[test]
    fn test_select_coldest() {
        let policy = EvictionPolicy::default();
        let candidates = ticks(&[("a", 5), ("b", 1), ("c", 9), ("d", 3), ("e", 7)]);

        let mut victims = policy.select_victims(candidates, 2, &"z");
        victims.sort();
        assert_eq!(victims, vec!["b", "d"]);
    }

    #[test]
    fn test_select_skips_protected() {
        let policy = EvictionPolicy::default();
        let candidates = ticks(&[("a", 5), ("b", 1), ("c", 9)]);

        let mut victims = policy.select_victims(candidates, 2, &"b");
        victims.sort();
        assert_eq!(victims, vec!["a", "c"]);
    }

    #[test]
    fn test_select_more_than_available() {
        let policy = EvictionPolicy::default();
        let candidates = ticks(&[("a", 5), ("b", 1)]);

        let mut victims = policy.select_victims(candidates, 10, &"a");
        victims.sort();
        assert_eq!(victims, vec!["b"]);
    }

    #[test]
    fn test_select_zero() {
        let policy = EvictionPolicy::default();
        let victims = policy.select_victims(ticks(&[("a", 1)]), 0, &"z");
        assert!(victims.is_empty());
    }
}
