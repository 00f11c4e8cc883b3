//! Memoizing Cache
//!
//! The single entry point that wraps an expensive computation.
//!
//! Every `get` runs the same fixed sequence: derive the key, serve the entry
//! or compute and insert it, record the access, apply the size limit and the
//! access/computed age limits, and finally launch a coupled refresh sweep if
//! one is configured.
//!
//! # Concurrency
//! The whole entry store sits behind one `RwLock`, so every store operation
//! is atomic and no caller ever sees a half-written entry. The wrapped
//! computation always runs outside the lock. Two concurrent misses on the
//! same arguments therefore both compute and the later insert wins; this
//! assumes the computation is a pure function of its arguments.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{
    derive_key, into_key, CacheKey, CacheStats, CallArgs, EntryInfo, EntryStore, Evictor,
};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::{spawn_coupled_refresh, spawn_independent_refresh};

/// Boxed future returned by a wrapped computation.
pub type ComputeFuture<V, E> = Pin<Box<dyn Future<Output = std::result::Result<V, E>> + Send>>;

/// Type-erased wrapped computation.
pub type ComputeFn<V, E> = Arc<dyn Fn(CallArgs) -> ComputeFuture<V, E> + Send + Sync>;

/// State shared between the facade and its background refresh work.
pub(crate) struct Shared<V, E> {
    pub(crate) store: RwLock<EntryStore<V>>,
    pub(crate) compute: ComputeFn<V, E>,
    pub(crate) config: CacheConfig,
    /// Set while a coupled sweep is running
    pub(crate) sweeping: AtomicBool,
}

// == Memo Cache ==
/// A memoizing cache around one computation.
///
/// # Example
/// ```ignore
/// let cache = MemoCache::new(
///     |args: CallArgs| async move { expensive(args).await },
///     CacheConfig::new().with_max_size(500),
/// )?;
/// let value = cache.get(CallArgs::new().arg(42)).await?;
/// ```
pub struct MemoCache<V, E> {
    shared: Arc<Shared<V, E>>,
    evictor: Evictor,
    shutdown: CancellationToken,
    refresh_task: Option<JoinHandle<()>>,
}

impl<V, E> MemoCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    // == Constructor ==
    /// Validates `config` and wraps `compute`.
    ///
    /// With independent refresh this also starts the periodic refresh task,
    /// which needs a running tokio runtime.
    pub fn new<F, Fut>(compute: F, config: CacheConfig) -> Result<Self>
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        config.validate()?;

        let compute: ComputeFn<V, E> =
            Arc::new(move |args: CallArgs| -> ComputeFuture<V, E> { Box::pin(compute(args)) });
        let evictor = Evictor::new(&config);
        let shared = Arc::new(Shared {
            store: RwLock::new(EntryStore::new()),
            compute,
            config,
            sweeping: AtomicBool::new(false),
        });

        let shutdown = CancellationToken::new();
        let refresh_task = if shared.config.independent_refresh() {
            Some(spawn_independent_refresh(Arc::clone(&shared), shutdown.clone())?)
        } else {
            None
        };

        Ok(Self {
            shared,
            evictor,
            shutdown,
            refresh_task,
        })
    }

    // == Get ==
    /// Returns the cached value for `args`, computing it on a miss.
    ///
    /// A failing computation is returned as is and nothing is cached.
    pub async fn get(&self, args: CallArgs) -> std::result::Result<V, E> {
        let started = Instant::now();
        let key = into_key(args);

        let value = match self.touch(&key).await {
            Some(value) => value,
            None => self.compute_and_insert(&key).await?,
        };

        self.evictor.enforce_max_size(&self.shared.store, &key).await;
        self.evictor.expire_by_access(&self.shared.store).await;
        self.evictor.expire_by_computed(&self.shared.store).await;

        if self.shared.config.coupled_refresh() {
            if let Err(err) = spawn_coupled_refresh(Arc::clone(&self.shared)) {
                warn!(error = %err, "Could not launch refresh sweep");
            }
        }

        if self.shared.config.debug_logging {
            debug!(
                %key,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cache get complete"
            );
        }

        Ok(value)
    }

    /// Records an access on a present entry and returns its value.
    async fn touch(&self, key: &CacheKey) -> Option<V> {
        let mut store = self.shared.store.write().await;
        let value = store.touch_access(key).ok()?.value.clone();
        store.stats_mut().record_hit();
        Some(value)
    }

    /// Runs the computation outside the lock, then installs and touches the
    /// entry in one critical section.
    async fn compute_and_insert(&self, key: &CacheKey) -> std::result::Result<V, E> {
        let computed_started = Instant::now();
        let value = (self.shared.compute)(key.args().clone()).await?;

        if self.shared.config.debug_logging {
            debug!(
                %key,
                elapsed_ms = computed_started.elapsed().as_millis() as u64,
                "Computed missing entry"
            );
        }

        let mut store = self.shared.store.write().await;
        store.stats_mut().record_miss();
        store.insert_or_update(key.clone(), value.clone());
        if let Err(err) = store.touch_access(key) {
            warn!(error = %err, "Entry missing right after insert");
        }

        Ok(value)
    }

    // == Is Cached ==
    /// Returns true if `args` currently has an entry. Has no side effects.
    pub async fn is_cached(&self, args: &CallArgs) -> bool {
        self.shared.store.read().await.contains(&derive_key(args))
    }

    /// Bookkeeping of the entry for `args`, if present.
    pub async fn entry_info(&self, args: &CallArgs) -> Option<EntryInfo> {
        let store = self.shared.store.read().await;
        store.lookup(&derive_key(args)).map(|entry| entry.info())
    }

    /// Value currently stored for `args`, without counting an access.
    pub async fn peek(&self, args: &CallArgs) -> Option<V> {
        let store = self.shared.store.read().await;
        store.lookup(&derive_key(args)).map(|entry| entry.value.clone())
    }

    /// Current number of entries.
    pub async fn len(&self) -> usize {
        self.shared.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.store.read().await.is_empty()
    }

    /// Snapshot of the cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.shared.store.read().await.stats()
    }
}

impl<V, E> MemoCache<V, E> {
    // == Terminate ==
    /// Stops independent refresh from scheduling further sweeps.
    ///
    /// A sweep in progress finishes normally. Has no effect in other
    /// refresh modes.
    pub fn terminate(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            if self.refresh_task.is_some() {
                info!("Independent refresh terminated");
            }
        }
    }

    /// True while the independent refresh task is still alive.
    pub fn is_refreshing(&self) -> bool {
        self.refresh_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }
}

impl<V, E> Drop for MemoCache<V, E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<V, E> fmt::Debug for MemoCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("config", &self.shared.config)
            .field("terminated", &self.shutdown.is_cancelled())
            .finish()
    }
}
