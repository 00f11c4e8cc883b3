//! Cache Entry Module
//!
//! Defines the per-key cached state: the value, the arguments needed to
//! recompute it, and the computed/accessed bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CallArgs;

// == Cache Entry ==
/// A single cached result with its metadata.
///
/// Entries are only ever created, mutated and dropped as a whole by the
/// entry store, so no field is observable without the others.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The last computed result
    pub value: V,
    /// Arguments the value was computed from, kept for refresh
    pub args: Arc<CallArgs>,
    /// When the value was last (re)computed
    pub computed_at: Instant,
    /// When the entry was last returned by `get`
    pub last_accessed_at: Instant,
    /// Number of `get` calls that hit or produced this entry
    pub access_count: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a freshly computed entry that has not been accessed yet.
    pub fn new(value: V, args: Arc<CallArgs>) -> Self {
        let now = Instant::now();
        Self {
            value,
            args,
            computed_at: now,
            last_accessed_at: now,
            access_count: 0,
        }
    }

    // == Recompute ==
    /// Replaces the value and resets the computed timestamp.
    pub fn recompute(&mut self, value: V) {
        self.value = value;
        self.computed_at = Instant::now();
    }

    // == Touch ==
    /// Records one access.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
    }

    /// Time since the value was last computed.
    pub fn computed_age(&self) -> Duration {
        self.computed_at.elapsed()
    }

    /// Time since the entry was last accessed.
    pub fn accessed_age(&self) -> Duration {
        self.last_accessed_at.elapsed()
    }

    // == Is Stale ==
    /// An entry is stale once strictly more than `ttl` has passed since it
    /// was computed.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.computed_age() > ttl
    }

    /// Snapshot of the bookkeeping, with wall-clock timestamps.
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            computed_at: wall_clock(self.computed_at),
            last_accessed_at: wall_clock(self.last_accessed_at),
            access_count: self.access_count,
        }
    }
}

// == Entry Info ==
/// Read-only view of an entry's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub computed_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

/// Maps a monotonic instant onto the wall clock.
fn wall_clock(instant: Instant) -> DateTime<Utc> {
    let elapsed =
        chrono::Duration::from_std(instant.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() - elapsed
}
