//! Cache Registry
//!
//! Binds one cache to each (owner, method) pair, the way a memoized method
//! gets its own cache per receiving object.
//!
//! The registry is created lazily per pair on first call and kept until the
//! owner is released. Calls are forwarded with the owner id prepended as the
//! first positional argument, so the wrapped computation sees the receiver
//! just like any other argument.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::CallArgs;
use crate::config::CacheConfig;
use crate::error::{CallError, Result};
use crate::memo::MemoCache;

/// Identifies one bound cache.
type Binding = (u64, &'static str);

// == Cache Registry ==
/// Lazily built caches, one per (owner id, method name).
pub struct CacheRegistry<V, E> {
    config: CacheConfig,
    caches: Mutex<HashMap<Binding, Arc<MemoCache<V, E>>>>,
}

impl<V, E> CacheRegistry<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Creates an empty registry whose caches all use `config`.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            caches: Mutex::new(HashMap::new()),
        })
    }

    // == Cache For ==
    /// Returns the cache bound to `(owner, method)`, building it from
    /// `compute` on first use. Later calls ignore `compute`.
    pub async fn cache_for<F, Fut>(
        &self,
        owner: u64,
        method: &'static str,
        compute: F,
    ) -> Result<Arc<MemoCache<V, E>>>
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        let mut caches = self.caches.lock().await;
        if let Some(cache) = caches.get(&(owner, method)) {
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(MemoCache::new(compute, self.config.clone())?);
        caches.insert((owner, method), Arc::clone(&cache));
        debug!(owner, method, "Bound new cache");
        Ok(cache)
    }

    // == Call ==
    /// Forwards one call through the cache bound to `(owner, method)`.
    pub async fn call<F, Fut>(
        &self,
        owner: u64,
        method: &'static str,
        args: CallArgs,
        compute: F,
    ) -> std::result::Result<V, CallError<E>>
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        let cache = self.cache_for(owner, method, compute).await?;
        cache
            .get(args.with_receiver(owner))
            .await
            .map_err(CallError::Compute)
    }

    /// Returns the cache bound to `(owner, method)` if one was built.
    pub async fn get(&self, owner: u64, method: &'static str) -> Option<Arc<MemoCache<V, E>>> {
        self.caches.lock().await.get(&(owner, method)).cloned()
    }

    // == Release Owner ==
    /// Drops every cache bound to `owner`, stopping their refresh tasks.
    ///
    /// Returns the number of caches released.
    pub async fn release_owner(&self, owner: u64) -> usize {
        let mut caches = self.caches.lock().await;
        let before = caches.len();
        caches.retain(|(bound_owner, _), cache| {
            if *bound_owner == owner {
                cache.terminate();
                false
            } else {
                true
            }
        });
        before - caches.len()
    }

    /// Number of bound caches.
    pub async fn len(&self) -> usize {
        self.caches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.caches.lock().await.is_empty()
    }
}
