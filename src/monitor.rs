// src/monitor.rs
// The scheduler: one control loop on a fixed tick decides, per registered
// stream, whether its fetch task is due and whether its previous run has
// finished. At most one run is ever in flight per stream, regardless of
// tick frequency or how slow the external API is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::item::Feed;
use crate::plugin::Stream;
use crate::queue::IngestionQueue;
use crate::task::StreamFetchTask;

/// Default control-loop tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);
/// Default minimum period between two fetch runs of the same stream.
pub const DEFAULT_FETCH_PERIOD: Duration = Duration::from_secs(15 * 60);

pub struct StreamsMonitor {
    tasks: Arc<RwLock<HashMap<String, Arc<StreamFetchTask>>>>,
    queue: Arc<IngestionQueue>,
    tick: Duration,
    fetch_period: Duration,
    shutdown: watch::Sender<bool>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl StreamsMonitor {
    pub fn new(queue: Arc<IngestionQueue>, tick: Duration, fetch_period: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            queue,
            tick,
            fetch_period,
            shutdown,
            control: Mutex::new(None),
        }
    }

    pub fn with_defaults(queue: Arc<IngestionQueue>) -> Self {
        Self::new(queue, DEFAULT_TICK, DEFAULT_FETCH_PERIOD)
    }

    /// Register a stream under an id. One fetch task is created per stream
    /// and lives until shutdown.
    pub fn add_stream(&self, id: impl Into<String>, stream: Arc<dyn Stream>) {
        let id = id.into();
        let task = Arc::new(StreamFetchTask::new(id.clone(), stream));
        let previous = self.tasks.write().insert(id.clone(), task);
        if previous.is_some() {
            tracing::warn!(stream = %id, "stream re-registered, replacing existing task");
        } else {
            tracing::info!(stream = %id, "stream registered");
        }
    }

    pub fn add_feed(&self, stream_id: &str, feed: Feed) -> Result<()> {
        let task = self
            .task(stream_id)
            .ok_or_else(|| anyhow!("unknown stream id: {stream_id}"))?;
        tracing::debug!(stream = %stream_id, feed = %feed.id, "feed added");
        task.add_feed(feed);
        Ok(())
    }

    pub fn remove_feed(&self, stream_id: &str, feed: &Feed) -> Result<()> {
        let task = self
            .task(stream_id)
            .ok_or_else(|| anyhow!("unknown stream id: {stream_id}"))?;
        let still_present = task.remove_feed(feed);
        tracing::debug!(stream = %stream_id, feed = %feed.id, still_present, "feed removed");
        Ok(())
    }

    pub fn task(&self, stream_id: &str) -> Option<Arc<StreamFetchTask>> {
        self.tasks.read().get(stream_id).cloned()
    }

    /// Per-stream feed counts for the status surface.
    pub fn feed_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .tasks
            .read()
            .iter()
            .map(|(id, task)| (id.clone(), task.feed_count()))
            .collect();
        counts.sort();
        counts
    }

    /// Spawn the control loop. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        let mut control = self.control.lock();
        if control.is_some() {
            tracing::warn!("monitor already started");
            return;
        }

        let tasks = Arc::clone(&self.tasks);
        let queue = Arc::clone(&self.queue);
        let tick = self.tick;
        let fetch_period = self.fetch_period;
        let mut shutdown = self.shutdown.subscribe();

        *control = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Outstanding run handle per stream id, owned by this loop.
            let mut inflight: HashMap<String, JoinHandle<usize>> = HashMap::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&tasks, &queue, fetch_period, &mut inflight).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            // Cooperative shutdown: wait for every outstanding run to
            // terminate before the loop returns.
            for (id, handle) in inflight.drain() {
                if let Err(e) = handle.await {
                    tracing::warn!(stream = %id, error = ?e, "fetch run panicked during shutdown");
                }
            }
            tracing::info!("streams monitor stopped");
        }));
        tracing::info!(tick = ?self.tick, fetch_period = ?self.fetch_period, "streams monitor started");
    }

    /// Signal the control loop and block until it, and every outstanding
    /// fetch run, has terminated.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.control.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = ?e, "monitor control loop panicked");
            }
        }
    }
}

/// One scheduler pass: resubmit every due task whose previous run has
/// completed.
async fn sweep(
    tasks: &RwLock<HashMap<String, Arc<StreamFetchTask>>>,
    queue: &Arc<IngestionQueue>,
    fetch_period: Duration,
    inflight: &mut HashMap<String, JoinHandle<usize>>,
) {
    let snapshot: Vec<(String, Arc<StreamFetchTask>)> = tasks
        .read()
        .iter()
        .map(|(id, task)| (id.clone(), Arc::clone(task)))
        .collect();

    for (id, task) in snapshot {
        // Rate limit: skip until the period has elapsed. A task that has
        // never run is immediately due.
        if let Some(elapsed) = task.elapsed_since_last_run() {
            if elapsed < fetch_period {
                continue;
            }
        }

        // At most one in-flight run per stream. Reaping a finished handle
        // awaits it (instant at this point) so a panicking run surfaces as
        // a logged JoinError instead of vanishing.
        if let Some(handle) = inflight.get(&id) {
            if !handle.is_finished() {
                tracing::debug!(stream = %id, "previous run still in flight, skipping");
                continue;
            }
            if let Some(handle) = inflight.remove(&id) {
                if let Err(e) = handle.await {
                    tracing::warn!(stream = %id, error = ?e, "fetch run panicked");
                }
            }
        }

        let queue = Arc::clone(queue);
        let handle = tokio::spawn(async move { task.run(&queue).await });
        inflight.insert(id, handle);
    }
}
