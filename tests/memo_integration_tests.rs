//! Integration Tests for the Memoizing Cache
//!
//! Drives the public API end to end with short real durations: hits and
//! misses, the three size policies, both age limits, coupled and
//! independent refresh, termination and concurrent callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use omoide::{
    derive_key, Arg, CacheConfig, CacheRegistry, CallArgs, CallError, ComputeFuture, MemoCache,
    RefreshMode, SizeEvictionPolicy,
};
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn args(n: i64) -> CallArgs {
    CallArgs::new().arg(n)
}

/// Computation returning `(n, how many times n was computed)`.
#[derive(Clone, Default)]
struct Counting {
    calls: Arc<Mutex<HashMap<i64, u64>>>,
}

impl Counting {
    fn compute(&self) -> impl Fn(CallArgs) -> ComputeFuture<(i64, u64), String> {
        let calls = Arc::clone(&self.calls);
        move |args: CallArgs| -> ComputeFuture<(i64, u64), String> {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = match args.get(0) {
                    Some(Arg::Int(n)) => *n,
                    other => return Err(format!("expected an integer, got {:?}", other)),
                };
                let mut calls = calls.lock().map_err(|e| e.to_string())?;
                let count = calls.entry(n).or_insert(0);
                *count += 1;
                Ok((n, *count))
            })
        }
    }

    fn calls_for(&self, n: i64) -> u64 {
        self.calls.lock().unwrap().get(&n).copied().unwrap_or(0)
    }

    fn total(&self) -> u64 {
        self.calls.lock().unwrap().values().sum()
    }
}

async fn get_all(cache: &MemoCache<(i64, u64), String>, keys: &[i64]) {
    for &n in keys {
        assert_ok!(cache.get(args(n)).await);
    }
}

// == Hits and Misses ==

#[tokio::test]
async fn test_repeated_get_computes_once() {
    let counting = Counting::default();
    let cache = assert_ok!(MemoCache::new(counting.compute(), CacheConfig::new()));

    let first = assert_ok!(cache.get(args(9)).await);
    let second = assert_ok!(cache.get(args(9)).await);

    assert_eq!(first, (9, 1));
    assert_eq!(first, second);
    assert_eq!(counting.calls_for(9), 1);
    assert_eq!(cache.entry_info(&args(9)).await.unwrap().access_count, 2);
}

#[tokio::test]
async fn test_equal_arguments_share_an_entry() {
    let counting = Counting::default();
    let cache = assert_ok!(MemoCache::new(counting.compute(), CacheConfig::new()));

    let a = CallArgs::new().arg(3).named("scale", 2.5).named("label", "x");
    let b = CallArgs::new().arg(3).named("label", "x").named("scale", 2.5);
    assert_eq!(derive_key(&a), derive_key(&b));

    assert_ok!(cache.get(a).await);
    assert_ok!(cache.get(b).await);
    assert_eq!(counting.total(), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_failed_computation_propagates() {
    let counting = Counting::default();
    let cache = assert_ok!(MemoCache::new(counting.compute(), CacheConfig::new()));

    let err = assert_err!(cache.get(CallArgs::new().arg("nine")).await);
    assert!(err.contains("expected an integer"));
    assert!(cache.is_empty().await);
}

// == Size Eviction ==

#[tokio::test]
async fn test_by_computed_recency_evicts_oldest_computed() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_max_size(4)
        .with_size_eviction_policy(SizeEvictionPolicy::ByComputedRecency);
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    for n in 1..=4 {
        assert_ok!(cache.get(args(n)).await);
        sleep(Duration::from_millis(5)).await;
    }
    // Accessing 1 does not change its computed time
    assert_ok!(cache.get(args(1)).await);
    assert_ok!(cache.get(args(5)).await);

    assert!(!cache.is_cached(&args(1)).await);
    for n in 2..=5 {
        assert!(cache.is_cached(&args(n)).await);
    }
}

#[tokio::test]
async fn test_by_access_recency_evicts_least_recently_used() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_max_size(4)
        .with_size_eviction_policy(SizeEvictionPolicy::ByAccessRecency);
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    for n in 1..=4 {
        assert_ok!(cache.get(args(n)).await);
        sleep(Duration::from_millis(5)).await;
    }
    assert_ok!(cache.get(args(1)).await);
    sleep(Duration::from_millis(5)).await;
    assert_ok!(cache.get(args(5)).await);

    assert!(cache.is_cached(&args(1)).await);
    assert!(!cache.is_cached(&args(2)).await);
    assert_eq!(cache.len().await, 4);
}

#[tokio::test]
async fn test_by_access_frequency_protects_triggering_key() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_max_size(4)
        .with_size_eviction_policy(SizeEvictionPolicy::ByAccessFrequency);
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    // Access counts: 1 -> 1, 2..4 -> 3
    get_all(&cache, &[1, 2, 3, 4, 2, 3, 4, 2, 3, 4]).await;

    assert_ok!(cache.get(args(5)).await);
    assert!(!cache.is_cached(&args(1)).await);
    assert!(cache.is_cached(&args(5)).await);

    // 5 now has the lowest count and is no longer protected
    assert_ok!(cache.get(args(6)).await);
    assert!(!cache.is_cached(&args(5)).await);
    assert!(cache.is_cached(&args(6)).await);
    for n in 2..=4 {
        assert!(cache.is_cached(&args(n)).await);
    }

    assert_eq!(cache.stats().await.size_evictions, 2);
}

// == Duration Eviction ==

#[tokio::test]
async fn test_computed_ttl_expires_lazily_one_entry_per_get() {
    let counting = Counting::default();
    let config = CacheConfig::new().with_computed_ttl(Duration::from_millis(200));
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    assert_ok!(cache.get(args(1)).await);
    sleep(Duration::from_millis(30)).await;
    assert_ok!(cache.get(args(2)).await);

    sleep(Duration::from_millis(300)).await;
    // Nothing happens without a get
    assert_eq!(cache.len().await, 2);

    assert_ok!(cache.get(args(3)).await);
    assert!(!cache.is_cached(&args(1)).await);
    assert!(cache.is_cached(&args(2)).await);
    assert!(cache.is_cached(&args(3)).await);
    assert_eq!(cache.stats().await.expired_by_computed, 1);
}

#[tokio::test]
async fn test_access_ttl_drops_idle_entry() {
    let counting = Counting::default();
    let config = CacheConfig::new().with_access_ttl(Duration::from_millis(150));
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    get_all(&cache, &[1, 2]).await;
    for _ in 0..4 {
        sleep(Duration::from_millis(60)).await;
        assert_ok!(cache.get(args(2)).await);
    }

    assert!(!cache.is_cached(&args(1)).await);
    assert!(cache.is_cached(&args(2)).await);
    assert_eq!(cache.stats().await.expired_by_access, 1);
}

// == Refresh ==

#[tokio::test]
async fn test_coupled_refresh_recomputes_stale_entries() {
    let counting = Counting::default();
    let config = CacheConfig::new().with_refresh(Duration::from_millis(100), RefreshMode::Coupled);
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    assert_eq!(assert_ok!(cache.get(args(1)).await), (1, 1));
    sleep(Duration::from_millis(150)).await;

    // The stale value is served, the sweep runs in the background
    assert_eq!(assert_ok!(cache.get(args(1)).await), (1, 1));
    sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.peek(&args(1)).await, Some((1, 2)));
    assert_eq!(counting.calls_for(1), 2);
}

#[tokio::test]
async fn test_independent_refresh_runs_periodically() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_refresh(Duration::from_millis(200), RefreshMode::Independent)
        .with_refresh_period(Duration::from_millis(600));
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));
    assert!(cache.is_refreshing());

    get_all(&cache, &[1, 2]).await;
    sleep(Duration::from_millis(1000)).await;

    // One sweep at ~600ms, the next is not due until ~1200ms
    assert_eq!(cache.peek(&args(1)).await, Some((1, 2)));
    assert_eq!(cache.peek(&args(2)).await, Some((2, 2)));
    assert!(cache.stats().await.refreshes >= 2);

    cache.terminate();
}

#[tokio::test]
async fn test_terminate_stops_further_sweeps() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_refresh(Duration::from_millis(20), RefreshMode::Independent)
        .with_refresh_period(Duration::from_millis(100));
    let cache = assert_ok!(MemoCache::new(counting.compute(), config));

    assert_ok!(cache.get(args(1)).await);
    cache.terminate();
    sleep(Duration::from_millis(350)).await;

    assert!(!cache.is_refreshing());
    assert_eq!(counting.calls_for(1), 1);
    // The cache keeps serving after termination
    assert_eq!(assert_ok!(cache.get(args(1)).await), (1, 1));
}

#[tokio::test]
async fn test_refresh_failure_keeps_previous_value() {
    let fail = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&fail);
    let compute = move |args: CallArgs| {
        let flag = Arc::clone(&flag);
        async move {
            if flag.load(Ordering::SeqCst) > 0 {
                return Err("backend down".to_string());
            }
            match args.get(0) {
                Some(Arg::Int(n)) => Ok(*n),
                _ => Err("expected an integer".to_string()),
            }
        }
    };
    let config = CacheConfig::new().with_refresh(Duration::from_millis(50), RefreshMode::Coupled);
    let cache = assert_ok!(MemoCache::new(compute, config));

    assert_eq!(assert_ok!(cache.get(args(4)).await), 4);
    fail.store(1, Ordering::SeqCst);
    sleep(Duration::from_millis(80)).await;

    assert_eq!(assert_ok!(cache.get(args(4)).await), 4);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(cache.peek(&args(4)).await, Some(4));
    assert!(cache.stats().await.refresh_failures >= 1);
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_leave_one_entry() {
    let counting = Counting::default();
    let cache = Arc::new(assert_ok!(MemoCache::new(
        counting.compute(),
        CacheConfig::new()
    )));

    let done = Arc::new(AtomicBool::new(false));

    // Readers never observe a half-installed entry
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    if cache.is_cached(&args(42)).await {
                        let info = cache.entry_info(&args(42)).await;
                        assert!(info.is_some_and(|info| info.access_count >= 1));
                        let (n, count) = cache.peek(&args(42)).await.unwrap();
                        assert_eq!(n, 42);
                        assert!(count >= 1);
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(args(42)).await })
        })
        .collect();

    for handle in handles {
        let (n, _) = assert_ok!(assert_ok!(handle.await));
        assert_eq!(n, 42);
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        assert_ok!(reader.await);
    }

    assert_eq!(cache.len().await, 1);
    assert!(counting.calls_for(42) >= 1);
    let stats = cache.stats().await;
    assert_eq!(stats.hits + stats.misses, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_respect_max_size() {
    let counting = Counting::default();
    let config = CacheConfig::new()
        .with_max_size(5)
        .with_size_eviction_policy(SizeEvictionPolicy::ByAccessRecency);
    let cache = Arc::new(assert_ok!(MemoCache::new(counting.compute(), config)));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for n in 0..25 {
                    cache.get(args(worker * 100 + n)).await?;
                }
                Ok::<_, String>(())
            })
        })
        .collect();

    for handle in handles {
        assert_ok!(assert_ok!(handle.await));
    }

    assert!(cache.len().await <= 5);
}

// == Registry ==

#[tokio::test]
async fn test_registry_binds_cache_per_owner() {
    let registry = assert_ok!(CacheRegistry::new(CacheConfig::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let describe = {
        let calls = Arc::clone(&calls);
        move |args: CallArgs| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(args.to_string()) }
        }
    };

    let first = assert_ok!(registry.call(1, "describe", args(5), describe.clone()).await);
    let again = assert_ok!(registry.call(1, "describe", args(5), describe.clone()).await);
    let other = assert_ok!(registry.call(2, "describe", args(5), describe.clone()).await);

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert!(first.starts_with("(1"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(registry.release_owner(1).await, 1);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_registry_rejects_invalid_config() {
    let result: Result<CacheRegistry<i64, String>, _> =
        CacheRegistry::new(CacheConfig::new().with_max_size(0));
    let Err(err) = result else {
        panic!("registry accepted max_size 0");
    };
    let call_err: CallError<String> = err.into();
    assert!(call_err.to_string().contains("max_size"));
}
