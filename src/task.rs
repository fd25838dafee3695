// src/task.rs
// One scheduling unit per registered stream: the stream adapter plus its
// live, reference-counted feed set and the timestamp of the last completed
// run. Created once at startup, lives for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;

use crate::item::Feed;
use crate::plugin::Stream;
use crate::queue::IngestionQueue;

/// Writes the completion timestamp when dropped, so `run` records it on
/// every exit path, unwinding out of a panicking plugin included. Without
/// this a broken stream would stay "never run" and be resubmitted on every
/// scheduler tick, ignoring the fetch period.
struct CompletionGuard<'a> {
    last_run: &'a Mutex<Option<Instant>>,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        *self.last_run.lock() = Some(Instant::now());
    }
}

pub struct StreamFetchTask {
    stream_id: String,
    stream: Arc<dyn Stream>,
    /// Feed → reference count. The same feed added by two collections must
    /// survive one removal; it disappears only when the count hits zero.
    /// Guarded by its own lock, independent of the queue's.
    feeds: Mutex<HashMap<Feed, usize>>,
    last_run: Mutex<Option<Instant>>,
}

impl StreamFetchTask {
    pub fn new(stream_id: impl Into<String>, stream: Arc<dyn Stream>) -> Self {
        Self {
            stream_id: stream_id.into(),
            stream,
            feeds: Mutex::new(HashMap::new()),
            last_run: Mutex::new(None),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.stream
    }

    /// Add a feed, or bump its reference count if already present.
    pub fn add_feed(&self, feed: Feed) {
        let mut feeds = self.feeds.lock();
        *feeds.entry(feed).or_insert(0) += 1;
    }

    /// Decrement a feed's reference count; the feed is removed only when
    /// the count reaches zero. Returns whether the feed is still present.
    pub fn remove_feed(&self, feed: &Feed) -> bool {
        let mut feeds = self.feeds.lock();
        match feeds.get_mut(feed) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                feeds.remove(feed);
                false
            }
            None => false,
        }
    }

    pub fn contains_feed(&self, feed: &Feed) -> bool {
        self.feeds.lock().contains_key(feed)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.lock().len()
    }

    /// Time since the last completed run; `None` means the task has never
    /// run and is immediately due.
    pub fn elapsed_since_last_run(&self) -> Option<Duration> {
        self.last_run.lock().map(|t| t.elapsed())
    }

    /// Execute one fetch run. The feed set is snapshotted at run start, so
    /// feeds added mid-run are picked up on the next scheduled run. Each
    /// feed is polled independently: a failing feed is logged and skipped
    /// without aborting the rest, and items are pushed per feed so a slow
    /// stream still contributes partial results if the process shuts down
    /// mid-run. `last_run` is always recorded, even after failures, so a
    /// broken stream does not spin the scheduler.
    pub async fn run(&self, queue: &IngestionQueue) -> usize {
        let _completed = CompletionGuard {
            last_run: &self.last_run,
        };
        let snapshot: Vec<Feed> = self.feeds.lock().keys().cloned().collect();
        let mut total = 0usize;

        for feed in &snapshot {
            match self.stream.poll(std::slice::from_ref(feed)).await {
                Ok(items) => {
                    total += items.len();
                    queue.push_all(items);
                }
                Err(e) => {
                    counter!("fetch_errors_total").increment(1);
                    tracing::warn!(
                        stream = %self.stream_id,
                        feed = %feed.id,
                        error = ?e,
                        "feed poll failed, continuing with remaining feeds"
                    );
                }
            }
        }

        counter!("fetch_runs_total").increment(1);
        tracing::debug!(stream = %self.stream_id, items = total, feeds = snapshot.len(), "fetch run complete");
        total
    }
}
