//! Query Cache Demo
//!
//! Walks one slow query through the cache lifecycle: a pending read, shared
//! suspending reads, a failing run and a manual invalidation, while a
//! subscriber task logs every change the cache publishes.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::{Config, Query, QueryCache};

const LOOKUP_DELAY_MS: u64 = 200;
const UNLUCKY: u32 = 13;

/// Main entry point for the query cache demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and subscribe to its changes
/// 4. Exercise reads, fetches and invalidation
/// 5. Print the final snapshot and statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting query cache demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: lifetime={:?}, autofetch={:?}, stale={:?}, notify_capacity={}",
        config.defaults.lifetime,
        config.defaults.autofetch,
        config.defaults.stale,
        config.notify_capacity
    );

    let cache = QueryCache::from_config(&config).context("cache needs a tokio runtime")?;

    let mut changes = cache.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => info!(
                    revision = change.revision,
                    query = %change.query,
                    key = %change.key,
                    kind = ?change.kind,
                    "Cache changed"
                ),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Change subscriber lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let double = Query::named("double", |(n,): (u32,)| async move {
        tokio::time::sleep(Duration::from_millis(LOOKUP_DELAY_MS)).await;
        if n == UNLUCKY {
            Err(format!("refusing to double {n}"))
        } else {
            Ok(n * 2)
        }
    });

    // Non-blocking read starts the run
    let entry = cache.query(&double, (15,))?;
    info!(status = ?entry.status(), loading = entry.is_loading(), "First read of double(15)");

    // Concurrent suspending reads share that run
    let (first, second) = tokio::join!(cache.fetch(&double, (15,)), cache.fetch(&double, (15,)));
    let (first, second) = (first?, second?);
    info!(?first, ?second, "Fetched double(15) twice");

    match cache.fetch(&double, (UNLUCKY,)).await? {
        Ok(value) => info!(value = *value, "Unexpected success"),
        Err(failure) => warn!(error = %failure, "double({UNLUCKY}) failed"),
    }

    cache.invalidate(&double, (15,), Some(31))?;
    let seeded = cache.peek(&double, &(15,))?;
    info!(value = ?seeded.and_then(|e| e.value()), "Seeded double(15) by hand");

    let snapshot = cache.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("{}", serde_json::to_string_pretty(&cache.stats())?);

    // Let the watcher drain before shutting down
    tokio::task::yield_now().await;
    watcher.abort();
    info!("Demo complete");
    Ok(())
}
