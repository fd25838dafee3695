// tests/handler_health.rs
// Binary circuit breaker: the periodic health check, and nothing else,
// moves storages between the active and eliminated sets.

use std::sync::Arc;
use std::time::Duration;

use streamhub::plugins::memory::MemoryStorage;
use streamhub::{IngestionQueue, Item, PipelineConfig, StorageHandler};

const HEALTH_INTERVAL: Duration = Duration::from_millis(25);

fn config() -> PipelineConfig {
    PipelineConfig {
        consumers: 2,
        watermark: 1_000,
        health_interval: HEALTH_INTERVAL,
    }
}

/// Enough real time for at least two health passes.
async fn let_health_settle() {
    tokio::time::sleep(HEALTH_INTERVAL * 4).await;
}

#[tokio::test]
async fn unhealthy_storage_is_eliminated_then_readmitted() {
    let queue = Arc::new(IngestionQueue::new());
    let handler = StorageHandler::new(Arc::clone(&queue), config());

    let steady = Arc::new(MemoryStorage::named("steady"));
    let flappy = Arc::new(MemoryStorage::named("flappy"));
    handler.open_and_register(steady.clone()).await.unwrap();
    handler.open_and_register(flappy.clone()).await.unwrap();
    handler.start();

    // Backend goes down; after a couple of checks it must be eliminated.
    flappy.set_healthy(false);
    let_health_settle().await;
    assert_eq!(handler.fanout().is_healthy("flappy"), Some(false));

    for i in 0..5 {
        handler.handle(Item::new(format!("down{i}"), "test"));
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(steady.stored_count(), 5, "healthy storage keeps receiving");
    assert_eq!(flappy.stored_count(), 0, "eliminated storage receives nothing");

    // Backend recovers; the next check readmits it without intervention.
    flappy.set_healthy(true);
    let_health_settle().await;
    assert_eq!(handler.fanout().is_healthy("flappy"), Some(true));

    handler.handle(Item::new("up", "test"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(flappy.stored_count(), 1, "readmitted storage receives the next item");
    assert_eq!(steady.stored_count(), 6);

    handler.stop().await;
}

#[tokio::test]
async fn failed_open_registers_eliminated_until_healthy() {
    let queue = Arc::new(IngestionQueue::new());
    let handler = StorageHandler::new(Arc::clone(&queue), config());

    let late = Arc::new(MemoryStorage::named("late"));
    late.set_healthy(false); // open() reports false
    handler.open_and_register(late.clone()).await.unwrap();
    assert_eq!(handler.fanout().is_healthy("late"), Some(false));

    handler.start();
    late.set_healthy(true);
    let_health_settle().await;

    handler.handle(Item::new("x", "test"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    handler.stop().await;

    assert_eq!(late.stored_count(), 1, "storage that came up late was readmitted");
}
