// src/handler.rs
// Composition root of the dispatch side: the shared queue, the consumer
// pool, the filter/processor chains, the storage fan-out set, and the
// health-check loop that maintains its active/eliminated partition and
// enforces the queue watermark.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::fanout::{StorageFanout, StorageHealth};
use crate::item::Item;
use crate::plugin::{ItemFilter, Processor, Storage};
use crate::queue::IngestionQueue;

/// Bounded wait per pop, so consumers observe shutdown promptly.
const POP_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Number of consumer workers draining the queue.
    pub consumers: usize,
    /// Queue depth beyond which the whole queue is cleared (lossy
    /// backpressure, by design).
    pub watermark: usize,
    /// Interval between health-check passes over all storages.
    pub health_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consumers: 8,
            watermark: 10_000,
            health_interval: Duration::from_secs(120),
        }
    }
}

struct FilterEntry {
    filter: Box<dyn ItemFilter>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterStats {
    pub name: String,
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerStats {
    pub queue_depth: usize,
    pub handled: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub storages: Vec<StorageHealth>,
    pub filters: Vec<FilterStats>,
}

/// Shared by every consumer and the health loop.
struct PipelineCtx {
    queue: Arc<IngestionQueue>,
    fanout: Arc<StorageFanout>,
    filters: RwLock<Vec<Arc<FilterEntry>>>,
    processors: RwLock<Vec<Arc<dyn Processor>>>,
    handled: AtomicU64,
    filtered: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineCtx {
    /// Filter chain → processor chain → active storage set, in configured
    /// order. The first rejecting filter drops the item; processors mutate
    /// in place and never reject.
    async fn process(&self, mut item: Item) {
        let filters: Vec<Arc<FilterEntry>> = self.filters.read().clone();
        for entry in &filters {
            if entry.filter.accept(&item) {
                entry.accepted.fetch_add(1, Ordering::Relaxed);
            } else {
                entry.rejected.fetch_add(1, Ordering::Relaxed);
                self.filtered.fetch_add(1, Ordering::Relaxed);
                counter!("pipeline_items_filtered_total").increment(1);
                tracing::debug!(item = %item.id, filter = entry.filter.name(), "item rejected");
                return;
            }
        }

        let processors: Vec<Arc<dyn Processor>> = self.processors.read().clone();
        for processor in &processors {
            processor.process(&mut item);
        }

        self.fanout.dispatch(item.operation, &item).await;
        self.handled.fetch_add(1, Ordering::Relaxed);
        counter!("pipeline_items_handled_total").increment(1);
    }
}

pub struct StorageHandler {
    ctx: Arc<PipelineCtx>,
    config: PipelineConfig,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl StorageHandler {
    pub fn new(queue: Arc<IngestionQueue>, config: PipelineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: Arc::new(PipelineCtx {
                queue,
                fanout: Arc::new(StorageFanout::new()),
                filters: RwLock::new(Vec::new()),
                processors: RwLock::new(Vec::new()),
                handled: AtomicU64::new(0),
                filtered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
            config,
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn fanout(&self) -> &Arc<StorageFanout> {
        &self.ctx.fanout
    }

    pub fn add_filter(&self, filter: Box<dyn ItemFilter>) {
        self.ctx.filters.write().push(Arc::new(FilterEntry {
            filter,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }));
    }

    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        self.ctx.processors.write().push(processor);
    }

    /// Register a storage after opening it. A storage whose open fails is
    /// registered eliminated, not dropped: the health loop readmits it when
    /// the backend comes back. Errors only on a duplicate storage name.
    pub async fn open_and_register(&self, storage: Arc<dyn Storage>) -> Result<()> {
        match storage.open().await {
            Ok(true) => self.ctx.fanout.register(storage),
            Ok(false) => {
                tracing::warn!(storage = storage.name(), "storage open returned false");
                self.ctx.fanout.register_eliminated(storage)
            }
            Err(e) => {
                tracing::warn!(storage = storage.name(), error = ?e, "storage open failed");
                self.ctx.fanout.register_eliminated(storage)
            }
        }
    }

    /// Enqueue one item. Never blocks on storage I/O.
    pub fn handle(&self, item: Item) {
        self.ctx.queue.push(item);
        gauge!("pipeline_queue_depth").set(self.ctx.queue.len() as f64);
    }

    /// Enqueue a batch.
    pub fn handle_batch(&self, items: Vec<Item>) {
        self.ctx.queue.push_all(items);
        gauge!("pipeline_queue_depth").set(self.ctx.queue.len() as f64);
    }

    /// Synchronously fan a delete out to every active storage, bypassing
    /// the queue. Returns how many storages reported the id existed.
    pub async fn delete(&self, id: &str) -> usize {
        self.ctx.fanout.delete(id).await
    }

    pub fn stats(&self) -> HandlerStats {
        let filters = self
            .ctx
            .filters
            .read()
            .iter()
            .map(|entry| FilterStats {
                name: entry.filter.name().to_string(),
                accepted: entry.accepted.load(Ordering::Relaxed),
                rejected: entry.rejected.load(Ordering::Relaxed),
            })
            .collect();

        HandlerStats {
            queue_depth: self.ctx.queue.len(),
            handled: self.ctx.handled.load(Ordering::Relaxed),
            filtered: self.ctx.filtered.load(Ordering::Relaxed),
            dropped: self.ctx.dropped.load(Ordering::Relaxed),
            storages: self.ctx.fanout.health_snapshot(),
            filters,
        }
    }

    /// Spawn the consumer pool and the health-check loop. Idempotent.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            tracing::warn!("handler already started");
            return;
        }

        for worker in 0..self.config.consumers {
            let ctx = Arc::clone(&self.ctx);
            let shutdown = self.shutdown.subscribe();
            workers.push(tokio::spawn(consumer_loop(worker, ctx, shutdown)));
        }

        let ctx = Arc::clone(&self.ctx);
        let shutdown = self.shutdown.subscribe();
        let watermark = self.config.watermark;
        let interval = self.config.health_interval;
        workers.push(tokio::spawn(health_loop(ctx, watermark, interval, shutdown)));

        tracing::info!(
            consumers = self.config.consumers,
            watermark = self.config.watermark,
            health_interval = ?self.config.health_interval,
            "storage handler started"
        );
    }

    /// Signal every worker and the health loop, wait for them to exit
    /// (each consumer drains remaining queued items best-effort first),
    /// then close every storage.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::warn!(error = ?e, "pipeline worker panicked");
            }
        }
        self.ctx.fanout.close_all().await;
        tracing::info!("storage handler stopped");
    }
}

async fn consumer_loop(worker: usize, ctx: Arc<PipelineCtx>, shutdown: watch::Receiver<bool>) {
    tracing::debug!(worker, "consumer started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Some(item) = ctx.queue.pop_timeout(POP_WAIT).await {
            ctx.process(item).await;
        }
    }
    // Best-effort flush of whatever is still queued.
    let mut flushed = 0usize;
    while let Some(item) = ctx.queue.try_pop() {
        ctx.process(item).await;
        flushed += 1;
    }
    if flushed > 0 {
        tracing::debug!(worker, flushed, "consumer drained remaining items on shutdown");
    }
    tracing::debug!(worker, "consumer stopped");
}

/// Periodic pass over every registered storage, plus the watermark check.
/// Health is re-evaluated wholesale each interval: a binary circuit breaker
/// with no half-open probing.
async fn health_loop(
    ctx: Arc<PipelineCtx>,
    watermark: usize,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for storage in ctx.fanout.all_snapshot() {
                    let healthy = storage.check_status().await;
                    ctx.fanout.set_healthy(storage.name(), healthy);
                }

                let depth = ctx.queue.len();
                gauge!("pipeline_queue_depth").set(depth as f64);
                if depth > watermark {
                    let dropped = ctx.queue.clear();
                    ctx.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                    counter!("pipeline_items_dropped_total").increment(dropped as u64);
                    tracing::warn!(dropped, watermark, "queue exceeded watermark, cleared");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("health loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Operation;
    use crate::plugins::memory::MemoryStorage;

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            consumers: 2,
            watermark: 50,
            health_interval: Duration::from_millis(25),
        }
    }

    #[tokio::test]
    async fn items_flow_to_registered_storage() {
        let queue = Arc::new(IngestionQueue::new());
        let handler = StorageHandler::new(Arc::clone(&queue), quick_config());
        let storage = Arc::new(MemoryStorage::named("m"));
        handler.open_and_register(storage.clone()).await.unwrap();

        handler.start();
        for i in 0..10 {
            handler.handle(Item::new(format!("i{i}"), "test"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler.stop().await;

        assert_eq!(storage.stored_count(), 10);
        assert_eq!(handler.stats().handled, 10);
        assert!(storage.is_closed());
    }

    #[tokio::test]
    async fn batched_items_flow_like_single_ones() {
        let queue = Arc::new(IngestionQueue::new());
        let handler = StorageHandler::new(Arc::clone(&queue), quick_config());
        let storage = Arc::new(MemoryStorage::named("m"));
        handler.open_and_register(storage.clone()).await.unwrap();

        handler.start();
        let batch: Vec<Item> = (0..12).map(|i| Item::new(format!("b{i}"), "test")).collect();
        handler.handle_batch(batch);
        handler.handle_batch(Vec::new());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler.stop().await;

        assert_eq!(storage.stored_count(), 12);
        assert_eq!(handler.stats().handled, 12);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_operations_are_routed() {
        let queue = Arc::new(IngestionQueue::new());
        let handler = StorageHandler::new(Arc::clone(&queue), quick_config());
        let storage = Arc::new(MemoryStorage::named("m"));
        handler.open_and_register(storage.clone()).await.unwrap();
        handler.start();

        handler.handle(Item::new("a", "test"));
        handler.handle(Item::new("a", "test").with_operation(Operation::Update));
        handler.handle(Item::new("a", "test").with_operation(Operation::Delete));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handler.stop().await;

        assert_eq!(storage.stored_count(), 1);
        assert_eq!(storage.updated_count(), 1);
        assert_eq!(storage.deleted_count(), 1);
    }

    #[tokio::test]
    async fn watermark_clears_queue_without_stopping_producers() {
        let queue = Arc::new(IngestionQueue::new());
        // Zero consumers so nothing drains: only the health loop runs and
        // the clear is deterministic.
        let config = PipelineConfig {
            consumers: 0,
            watermark: 20,
            health_interval: Duration::from_millis(20),
        };
        let handler = StorageHandler::new(Arc::clone(&queue), config);

        for i in 0..(config.watermark + 1) {
            handler.handle(Item::new(format!("i{i}"), "test"));
        }
        assert!(queue.len() > config.watermark);

        handler.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        handler.stop().await;

        let stats = handler.stats();
        assert_eq!(stats.dropped, (config.watermark + 1) as u64);
        assert_eq!(queue.len(), 0);
    }
}
