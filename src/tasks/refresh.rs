//! Refresh Tasks
//!
//! Background recomputation of stale entries, either launched after every
//! `get` (coupled) or driven by a periodic task (independent).
//!
//! A sweep snapshots the current keys and recomputes each entry older than
//! the refresh TTL from its stored arguments. A failing recompute leaves the
//! previous value in place and the sweep moves on to the next key.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::EntryStore;
use crate::config::{CacheConfig, RefreshMode};
use crate::error::{CacheError, Result};
use crate::memo::{ComputeFn, Shared};

// == Sweep Report ==
/// Outcome of one refresh sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries recomputed and stored
    pub refreshed: usize,
    /// Entries whose recompute failed
    pub failed: usize,
    /// Entries evicted while they were being recomputed
    pub dropped: usize,
}

// == Refresh Stale ==
/// Recomputes every entry computed more than `ttl` ago.
pub async fn refresh_stale<V, E>(
    store: &RwLock<EntryStore<V>>,
    compute: &ComputeFn<V, E>,
    ttl: Duration,
    debug_logging: bool,
) -> SweepReport
where
    V: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let started = Instant::now();
    let keys = store.read().await.keys();
    let mut report = SweepReport::default();

    for key in keys {
        let args = {
            let guard = store.read().await;
            match guard.lookup(&key) {
                Some(entry) if entry.is_stale(ttl) => Arc::clone(&entry.args),
                _ => continue,
            }
        };

        let key_started = Instant::now();
        // Run on its own task so a panicking computation only fails this key
        let outcome = tokio::spawn(compute((*args).clone())).await;

        let reason = match outcome {
            Ok(Ok(value)) => {
                match store.write().await.refresh(&key, value) {
                    Ok(()) => {
                        report.refreshed += 1;
                        if debug_logging {
                            debug!(
                                %key,
                                elapsed_ms = key_started.elapsed().as_millis() as u64,
                                "Refreshed entry"
                            );
                        }
                    }
                    Err(err) => {
                        report.dropped += 1;
                        debug!(error = %err, "Entry evicted during refresh, result discarded");
                    }
                }
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(join_err) => join_err.to_string(),
        };

        let err = CacheError::RefreshKey {
            key: key.clone(),
            reason,
        };
        warn!(error = %err, "Refresh failed, keeping previous value");
        store.write().await.stats_mut().record_refresh_failure();
        report.failed += 1;
    }

    if debug_logging {
        debug!(
            refreshed = report.refreshed,
            failed = report.failed,
            dropped = report.dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh sweep complete"
        );
    }

    report
}

/// Returns the refresh TTL if refresh runs in `mode`.
fn refresh_ttl_for(config: &CacheConfig, mode: RefreshMode) -> Result<Duration> {
    let ttl = config.refresh_ttl().ok_or_else(|| {
        CacheError::Misuse(format!(
            "{} refresh requested, but refresh is disabled",
            mode
        ))
    })?;

    if config.refresh_mode != mode {
        return Err(CacheError::Misuse(format!(
            "{} refresh requested, but refresh mode is {}",
            mode, config.refresh_mode
        )));
    }

    Ok(ttl)
}

// == Coupled Refresh ==
/// Launches one sweep in the background and returns immediately.
///
/// Returns `None` without launching when a sweep of this cache is still
/// running; that sweep already covers every stale key.
pub(crate) fn spawn_coupled_refresh<V, E>(
    shared: Arc<Shared<V, E>>,
) -> Result<Option<JoinHandle<()>>>
where
    V: Send + Sync + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let ttl = refresh_ttl_for(&shared.config, RefreshMode::Coupled)?;

    if shared
        .sweeping
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(None);
    }

    Ok(Some(tokio::spawn(async move {
        refresh_stale(&shared.store, &shared.compute, ttl, shared.config.debug_logging).await;
        shared.sweeping.store(false, Ordering::Release);
    })))
}

// == Independent Refresh ==
/// Spawns the periodic refresh task.
///
/// The first sweep runs immediately, then one every refresh period until
/// `shutdown` is cancelled. Cancellation is observed while waiting, so it
/// takes effect at once; a sweep already running completes first.
pub(crate) fn spawn_independent_refresh<V, E>(
    shared: Arc<Shared<V, E>>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>>
where
    V: Send + Sync + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let ttl = refresh_ttl_for(&shared.config, RefreshMode::Independent)?;
    let period = shared.config.refresh_period().ok_or_else(|| {
        CacheError::Misuse("independent refresh requested without a refresh period".to_string())
    })?;
    let runtime = Handle::try_current()
        .map_err(|_| CacheError::config("independent refresh requires a running tokio runtime"))?;

    Ok(runtime.spawn(async move {
        info!(
            ttl_ms = ttl.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Starting independent refresh task"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report =
                refresh_stale(&shared.store, &shared.compute, ttl, shared.config.debug_logging)
                    .await;
            if report.refreshed > 0 || report.failed > 0 {
                info!(
                    refreshed = report.refreshed,
                    failed = report.failed,
                    "Independent refresh sweep"
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }

        info!("Independent refresh task stopped");
    }))
}
