use anyhow::{ensure, Result};
use cachetable_core::{CacheConfig, Registry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachetable_demo=info,cachetable_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    tracing::info!("🧪 Cachetable demo");
    tracing::info!("   Inline reschedule: {}", config.inline_reschedule);

    let registry: Registry<String> = Registry::with_config(config);

    test_expiration_timeline(&registry).await?;
    test_expire_callback(&registry).await?;
    test_flush(&registry)?;
    test_concurrent_inserts(&registry).await?;

    tracing::info!("✅ All scenarios passed!");

    Ok(())
}

/// Short-lived, permanent and kept-alive entries in one table
async fn test_expiration_timeline(registry: &Registry<String>) -> Result<()> {
    tracing::info!("Scenario: Expiration timeline");

    let table = registry.table("timeline");
    let start = Instant::now();

    table.insert("a", Duration::from_millis(50), "alpha".to_string());
    table.insert("b", Duration::ZERO, "beta".to_string());
    table.insert("c", Duration::from_millis(100), "gamma".to_string());

    sleep_until(start, 60).await;
    ensure!(table.get("a").is_err(), "\"a\" should have expired by 60ms");

    sleep_until(start, 80).await;
    ensure!(table.get("c").is_ok(), "\"c\" should be alive at 80ms");

    sleep_until(start, 150).await;
    ensure!(
        table.contains_key("c"),
        "\"c\" should survive past 100ms after being read at 80ms"
    );

    sleep_until(start, 200).await;
    ensure!(!table.contains_key("c"), "\"c\" should have expired by 200ms");
    ensure!(table.get("b").is_ok(), "permanent \"b\" should never expire");

    tracing::info!("   ✓ Expiration and keep-alive work correctly");
    table.flush();
    Ok(())
}

/// The callback runs once, before the entry disappears
async fn test_expire_callback(registry: &Registry<String>) -> Result<()> {
    tracing::info!("Scenario: Expire callback");

    let table = registry.table("callbacks");
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    table.insert_with_callback(
        "session:1",
        Duration::from_millis(30),
        "payload".to_string(),
        move |key: &str| {
            tracing::info!("   about to expire: {}", key);
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    tokio::time::sleep(Duration::from_millis(100)).await;

    ensure!(table.is_empty(), "entry should have been evicted");
    ensure!(
        calls.load(Ordering::SeqCst) == 1,
        "callback should run exactly once, ran {} times",
        calls.load(Ordering::SeqCst)
    );

    tracing::info!("   ✓ Callback fired exactly once");
    table.flush();
    Ok(())
}

fn test_flush(registry: &Registry<String>) -> Result<()> {
    tracing::info!("Scenario: Flush");

    let table = registry.table("flush");
    let other = registry.table("untouched");
    table.insert("key", Duration::from_secs(60), "value".to_string());
    other.insert("key", Duration::ZERO, "value".to_string());

    table.flush();

    ensure!(table.count() == 0, "flushed table should be empty");
    ensure!(!registry.contains("flush"), "flushed table should be deregistered");
    ensure!(registry.table("flush").is_empty(), "new table should start empty");
    ensure!(other.count() == 1, "other tables must not be affected");

    tracing::info!("   ✓ Flush empties and deregisters only its own table");
    other.flush();
    registry.table("flush").flush();
    Ok(())
}

/// Distinct keys written from plain threads are never lost
async fn test_concurrent_inserts(registry: &Registry<String>) -> Result<()> {
    tracing::info!("Scenario: Concurrent inserts (8 threads x 250 keys)");

    let table = registry.table("concurrent");
    let start = Instant::now();

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let table = table.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    table.insert(
                        format!("thread{}:key{}", thread_id, i),
                        Duration::from_secs(30),
                        format!("value-{}", i),
                    );
                }
            })
        })
        .collect();

    let joined = tokio::task::spawn_blocking(move || {
        handles
            .into_iter()
            .all(|handle| handle.join().is_ok())
    })
    .await?;
    ensure!(joined, "an insert thread panicked");

    ensure!(
        table.count() == 2000,
        "expected 2000 entries, found {}",
        table.count()
    );

    tracing::info!("   ✓ 2000 inserts in {:?}", start.elapsed());
    table.flush();
    Ok(())
}

async fn sleep_until(start: Instant, millis: u64) {
    let target = start + Duration::from_millis(millis);
    let now = Instant::now();
    if target > now {
        tokio::time::sleep(target - now).await;
    }
}
