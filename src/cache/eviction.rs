//! Eviction Engine
//!
//! Enforces the maximum entry count and the two age limits after each `get`.
//!
//! Candidate selection runs under the read lock and removal under the write
//! lock, so a candidate may vanish in between when several callers evict at
//! once. Removal is retried with a fresh candidate up to
//! [`MAX_EVICTION_ATTEMPTS`] times; past that the store is cleared outright.

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{CacheKey, EntryStore, MAX_EVICTION_ATTEMPTS};
use crate::config::{CacheConfig, SizeEvictionPolicy};
use crate::error::CacheError;

use std::time::Duration;

// == Candidate Selection ==
/// Key with the oldest computed timestamp.
pub fn oldest_computed<V>(store: &EntryStore<V>) -> Option<CacheKey> {
    store
        .iter()
        .min_by_key(|(_, entry)| entry.computed_at)
        .map(|(key, _)| key.clone())
}

/// Key with the oldest access timestamp.
pub fn oldest_accessed<V>(store: &EntryStore<V>) -> Option<CacheKey> {
    store
        .iter()
        .min_by_key(|(_, entry)| entry.last_accessed_at)
        .map(|(key, _)| key.clone())
}

/// Key with the lowest access count, skipping `protected`.
pub fn least_accessed<V>(store: &EntryStore<V>, protected: &CacheKey) -> Option<CacheKey> {
    store
        .iter()
        .filter(|(key, _)| *key != protected)
        .min_by_key(|(_, entry)| entry.access_count)
        .map(|(key, _)| key.clone())
}

// == Evictor ==
/// Applies the configured size and age limits to a store.
#[derive(Debug, Clone)]
pub struct Evictor {
    max_size: usize,
    policy: SizeEvictionPolicy,
    access_ttl: Option<Duration>,
    computed_ttl: Option<Duration>,
}

impl Evictor {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            policy: config.size_eviction_policy,
            access_ttl: config.access_ttl(),
            computed_ttl: config.computed_ttl(),
        }
    }

    /// Picks the next entry to drop for the size limit.
    ///
    /// `trigger` is the key whose `get` started this pass; only the
    /// frequency policy looks at it.
    pub fn select_candidate<V>(
        &self,
        store: &EntryStore<V>,
        trigger: &CacheKey,
    ) -> Option<CacheKey> {
        match self.policy {
            SizeEvictionPolicy::ByComputedRecency => oldest_computed(store),
            SizeEvictionPolicy::ByAccessRecency => oldest_accessed(store),
            SizeEvictionPolicy::ByAccessFrequency => least_accessed(store, trigger),
        }
    }

    // == Size Eviction ==
    /// Removes entries until the store holds at most `max_size` of them.
    ///
    /// Returns the number of entries removed, not counting a full clear.
    pub async fn enforce_max_size<V>(
        &self,
        store: &RwLock<EntryStore<V>>,
        trigger: &CacheKey,
    ) -> usize {
        let mut removed = 0;

        loop {
            let candidate = {
                let guard = store.read().await;
                if guard.len() <= self.max_size {
                    break;
                }
                self.select_candidate(&*guard, trigger)
            };

            let Some(candidate) = candidate else {
                break;
            };

            let reselect = |s: &EntryStore<V>| self.select_candidate(s, trigger);
            match remove_with_retry(store, candidate, reselect).await {
                Removal::Removed => removed += 1,
                Removal::Exhausted => break,
                Removal::Cleared => return removed,
            }
        }

        removed
    }

    // == Duration Eviction ==
    /// Drops the least recently accessed entry if it is past the access TTL.
    pub async fn expire_by_access<V>(&self, store: &RwLock<EntryStore<V>>) -> Option<CacheKey> {
        let ttl = self.access_ttl?;
        let mut guard = store.write().await;

        let key = oldest_accessed(&*guard)?;
        let age = guard.lookup(&key)?.accessed_age();
        if age <= ttl {
            return None;
        }

        guard.remove(&key).ok()?;
        guard.stats_mut().record_access_expiry();
        debug!(%key, age_ms = age.as_millis() as u64, "Dropped entry past access TTL");
        Some(key)
    }

    /// Drops the least recently computed entry if it is past the computed TTL.
    pub async fn expire_by_computed<V>(&self, store: &RwLock<EntryStore<V>>) -> Option<CacheKey> {
        let ttl = self.computed_ttl?;
        let mut guard = store.write().await;

        let key = oldest_computed(&*guard)?;
        let age = guard.lookup(&key)?.computed_age();
        if age <= ttl {
            return None;
        }

        guard.remove(&key).ok()?;
        guard.stats_mut().record_computed_expiry();
        debug!(%key, age_ms = age.as_millis() as u64, "Dropped entry past computed TTL");
        Some(key)
    }
}

/// Outcome of one bounded removal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    /// A candidate was removed
    Removed,
    /// No candidate left to try
    Exhausted,
    /// Every attempt lost a race; the store was cleared
    Cleared,
}

/// Removes `candidate`, reselecting with `reselect` whenever the chosen key
/// turns out to be gone already.
pub(crate) async fn remove_with_retry<V, F>(
    store: &RwLock<EntryStore<V>>,
    mut candidate: CacheKey,
    reselect: F,
) -> Removal
where
    F: Fn(&EntryStore<V>) -> Option<CacheKey>,
{
    let mut attempts = 0;

    loop {
        let mut guard = store.write().await;
        match guard.remove(&candidate) {
            Ok(_) => {
                guard.stats_mut().record_size_eviction();
                debug!(key = %candidate, "Dropped entry to respect max size");
                return Removal::Removed;
            }
            Err(err) => {
                attempts += 1;
                warn!(
                    error = %err,
                    attempt = attempts,
                    "Size eviction candidate already removed, retrying"
                );

                if attempts >= MAX_EVICTION_ATTEMPTS {
                    let err = CacheError::EvictionInconsistency { attempts };
                    let dropped = guard.clear();
                    guard.stats_mut().record_store_clear();
                    warn!(error = %err, dropped, "Clearing the whole cache");
                    return Removal::Cleared;
                }

                match reselect(&*guard) {
                    Some(next) => candidate = next,
                    None => return Removal::Exhausted,
                }
            }
        }
    }
}
