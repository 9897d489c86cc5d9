//! Near Cache demo
//!
//! Runs a near cache in front of an in-process remote map, drives a small
//! read-mostly workload against it and reports statistics until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use near_cache::{InMemoryRemoteMap, NearCache, NearCacheConfig};

const MAP_NAME: &str = "products";
const PRODUCT_COUNT: u64 = 500;
const WORKLOAD_TICK: Duration = Duration::from_millis(10);
const REPORT_EVERY: u64 = 500;

/// Main entry point for the near cache demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Seed the in-memory remote map
/// 4. Create and start the near cache
/// 5. Run the workload until SIGINT/SIGTERM
/// 6. Destroy the near cache and print final statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "near_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting near cache demo");

    let config = NearCacheConfig::from_env();
    info!(
        "Configuration loaded: max_size={}, ttl={}s, max_idle={}s, format={:?}, cleanup_interval={}ms",
        config.max_size,
        config.time_to_live_seconds,
        config.max_idle_seconds,
        config.in_memory_format,
        config.cleanup_interval_millis
    );

    let remote: Arc<InMemoryRemoteMap<u64, String>> = Arc::new(InMemoryRemoteMap::new(MAP_NAME));
    for id in 0..PRODUCT_COUNT {
        remote.put(id, format!("product-{}-rev-0", id)).await;
    }
    info!("Remote map '{}' seeded with {} entries", remote.name(), remote.len().await);

    let cache = NearCache::with_remote(MAP_NAME, config, remote.clone())
        .context("invalid near cache configuration")?;
    cache.start().context("failed to start near cache")?;

    tokio::select! {
        result = run_workload(&cache, &remote) => result?,
        _ = shutdown_signal() => {}
    }

    cache.destroy().await;

    let stats = cache.stats();
    info!(
        "Final hit ratio {:.2} over {} reads, {} remote round trips",
        stats.hit_ratio(),
        stats.hits + stats.misses,
        remote.fetch_count()
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

/// Reads a skewed key range through the near cache and occasionally
/// rewrites a remote entry so invalidations flow back.
async fn run_workload(
    cache: &NearCache<u64, String>,
    remote: &InMemoryRemoteMap<u64, String>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(WORKLOAD_TICK);
    let mut step: u64 = 0;

    loop {
        ticker.tick().await;
        step += 1;

        // most reads land on the first tenth of the key space
        let id = if step % 5 == 0 {
            (step * 7919) % PRODUCT_COUNT
        } else {
            (step * 31) % (PRODUCT_COUNT / 10)
        };

        if let Err(e) = cache.fetch(&id).await {
            warn!("Read of product {} failed: {}", id, e);
        }

        if step % 50 == 0 {
            let changed = step % (PRODUCT_COUNT / 10);
            remote
                .put(changed, format!("product-{}-rev-{}", changed, step))
                .await;
        }

        if step % REPORT_EVERY == 0 {
            let stats = cache.stats();
            info!("Near cache stats: {}", serde_json::to_string(&stats)?);
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
