//! Entry Store Module
//!
//! Holds every cached entry keyed by its derived key.
//!
//! The store itself is a plain map; the cache facade wraps it in a single
//! `RwLock` so each operation below is atomic with respect to every other.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheKey, CacheStats};
use crate::error::{CacheError, Result};

// == Entry Store ==
/// Mapping from key to entry, plus running statistics.
#[derive(Debug)]
pub struct EntryStore<V> {
    /// Per-key state
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
}

impl<V> Default for EntryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> EntryStore<V> {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
        }
    }

    // == Lookup ==
    /// Returns the entry for `key` without touching its bookkeeping.
    pub fn lookup(&self, key: &CacheKey) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Returns true if an entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    // == Insert Or Update ==
    /// Stores a freshly computed value for `key`.
    ///
    /// A new key gets a complete entry with no accesses yet. An existing key
    /// keeps its access bookkeeping and only has its value and computed
    /// timestamp replaced. Returns true if the entry was created.
    pub fn insert_or_update(&mut self, key: CacheKey, value: V) -> bool {
        let created = match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.recompute(value);
                false
            }
            None => {
                let entry = CacheEntry::new(value, key.shared_args());
                self.entries.insert(key, entry);
                true
            }
        };
        self.stats.set_total_entries(self.entries.len());
        created
    }

    // == Refresh ==
    /// Replaces the value of an entry that is still present.
    ///
    /// Unlike [`insert_or_update`](Self::insert_or_update) this never
    /// creates an entry, so a key evicted while it was being recomputed
    /// stays evicted.
    pub fn refresh(&mut self, key: &CacheKey, value: V) -> Result<()> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.recompute(value);
                self.stats.record_refresh();
                Ok(())
            }
            None => Err(CacheError::KeyAbsent(key.clone())),
        }
    }

    // == Touch Access ==
    /// Records one access on `key` and returns the updated entry.
    pub fn touch_access(&mut self, key: &CacheKey) -> Result<&CacheEntry<V>> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                Ok(&*entry)
            }
            None => Err(CacheError::KeyAbsent(key.clone())),
        }
    }

    // == Remove ==
    /// Removes the whole entry for `key`.
    pub fn remove(&mut self, key: &CacheKey) -> Result<CacheEntry<V>> {
        let removed = self
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::KeyAbsent(key.clone()))?;
        self.stats.set_total_entries(self.entries.len());
        Ok(removed)
    }

    // == Clear ==
    /// Drops every entry. Returns the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.set_total_entries(0);
        count
    }

    // == Keys ==
    /// Point-in-time copy of the current keys.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.keys().cloned().collect()
    }

    /// Iterates over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry<V>)> {
        self.entries.iter()
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Stats ==
    /// Returns current statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }
}
