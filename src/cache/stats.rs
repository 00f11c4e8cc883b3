//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and refresh outcomes.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of `get` calls served from the store
    pub hits: u64,
    /// Number of `get` calls that had to compute
    pub misses: u64,
    /// Entries removed to respect the maximum size
    pub size_evictions: u64,
    /// Entries removed because they were not accessed for too long
    pub expired_by_access: u64,
    /// Entries removed because they were computed too long ago
    pub expired_by_computed: u64,
    /// Entries recomputed by a refresh sweep
    pub refreshes: u64,
    /// Refresh recomputations that failed
    pub refresh_failures: u64,
    /// Times the whole store was cleared after an eviction inconsistency
    pub store_clears: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total entries removed by any eviction rule.
    pub fn evictions(&self) -> u64 {
        self.size_evictions + self.expired_by_access + self.expired_by_computed
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_size_eviction(&mut self) {
        self.size_evictions += 1;
    }

    pub fn record_access_expiry(&mut self) {
        self.expired_by_access += 1;
    }

    pub fn record_computed_expiry(&mut self) {
        self.expired_by_computed += 1;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    pub fn record_refresh_failure(&mut self) {
        self.refresh_failures += 1;
    }

    pub fn record_store_clear(&mut self) {
        self.store_clears += 1;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
