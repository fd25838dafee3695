// tests/monitor_overlap.rs
// Scheduler property: no two fetch runs of the same stream ever execute
// concurrently, even when ticks arrive much faster than the external call
// returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use streamhub::{Feed, IngestionQueue, Item, Stream, StreamsMonitor};

/// Poll takes far longer than a scheduler tick and records how many calls
/// overlap.
struct SlowStream {
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    polls: AtomicUsize,
}

impl SlowStream {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Stream for SlowStream {
    async fn poll(&self, _feeds: &[Feed]) -> Result<Vec<Item>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.polls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(60)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![Item::new("i", "slow")])
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn polls_are_serialized_per_stream() {
    let queue = Arc::new(IngestionQueue::new());
    // Ticks every 5ms, zero period: the task is due on every tick, but a
    // run takes 60ms.
    let monitor = StreamsMonitor::new(
        Arc::clone(&queue),
        Duration::from_millis(5),
        Duration::ZERO,
    );

    let stream = Arc::new(SlowStream::new());
    monitor.add_stream("slow", stream.clone() as Arc<dyn Stream>);
    monitor
        .add_feed("slow", Feed::keywords("f1", vec![]))
        .unwrap();

    monitor.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    monitor.stop().await;

    let polls = stream.polls.load(Ordering::SeqCst);
    assert!(polls >= 2, "task was resubmitted once a run completed (got {polls})");
    assert_eq!(
        stream.max_concurrent.load(Ordering::SeqCst),
        1,
        "no two runs of the same stream ever overlapped"
    );
    assert_eq!(queue.len(), polls, "every completed poll contributed its item");
}

#[tokio::test]
async fn independent_streams_may_run_concurrently() {
    let queue = Arc::new(IngestionQueue::new());
    let monitor = StreamsMonitor::new(
        Arc::clone(&queue),
        Duration::from_millis(5),
        Duration::ZERO,
    );

    let a = Arc::new(SlowStream::new());
    let b = Arc::new(SlowStream::new());
    monitor.add_stream("a", a.clone() as Arc<dyn Stream>);
    monitor.add_stream("b", b.clone() as Arc<dyn Stream>);
    monitor.add_feed("a", Feed::keywords("fa", vec![])).unwrap();
    monitor.add_feed("b", Feed::keywords("fb", vec![])).unwrap();

    monitor.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop().await;

    // The invariant is per stream, not global.
    assert_eq!(a.max_concurrent.load(Ordering::SeqCst), 1);
    assert_eq!(b.max_concurrent.load(Ordering::SeqCst), 1);
    assert!(a.polls.load(Ordering::SeqCst) >= 1);
    assert!(b.polls.load(Ordering::SeqCst) >= 1);
}
