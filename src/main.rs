//! Omoide demo
//!
//! Wraps a slow power computation in a cache and shows miss/hit timings.
//! Cache settings come from the `OMOIDE_*` environment variables.

use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omoide::{Arg, CacheConfig, CallArgs, MemoCache};

const POWER: u32 = 3;

/// Stands in for an expensive call: sleeps, then raises the number to `POWER`.
async fn costly_power(args: CallArgs) -> Result<i64, String> {
    let number = match args.get(0) {
        Some(Arg::Int(n)) => *n,
        other => return Err(format!("expected an integer, got {:?}", other)),
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    number
        .checked_pow(POWER)
        .ok_or_else(|| format!("{}^{} overflows", number, POWER))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omoide=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env().context("invalid OMOIDE_* configuration")?;
    info!(
        max_size = config.max_size,
        policy = %config.size_eviction_policy,
        refresh_mode = %config.refresh_mode,
        "Configuration loaded"
    );

    let cache = MemoCache::new(costly_power, config).context("failed to build cache")?;

    for number in [1, 1, 1, 2, 1, 1, 3] {
        let started = Instant::now();
        let value = cache
            .get(CallArgs::new().arg(number))
            .await
            .map_err(anyhow::Error::msg)?;
        info!(
            number,
            value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "costly_power"
        );
    }

    let stats = cache.stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        entries = stats.total_entries,
        "Cache statistics"
    );

    cache.terminate();
    Ok(())
}
