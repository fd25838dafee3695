// src/queue.rs
// The shared FIFO between stream fetch tasks (producers) and the consumer
// pool. Unbounded in type, bounded in practice by a watermark: the health
// loop clears the whole queue when depth exceeds it. Producers never block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::item::Item;

pub struct IngestionQueue {
    inner: Mutex<VecDeque<Item>>,
    // Depth mirrored outside the lock so observers never contend with
    // producers/consumers.
    depth: AtomicUsize,
    notify: Notify,
}

impl Default for IngestionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, item: Item) {
        {
            let mut q = self.inner.lock();
            q.push_back(item);
            self.depth.store(q.len(), Ordering::Relaxed);
        }
        self.notify.notify_one();
    }

    pub fn push_all(&self, items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        let n = items.len();
        {
            let mut q = self.inner.lock();
            q.extend(items);
            self.depth.store(q.len(), Ordering::Relaxed);
        }
        for _ in 0..n {
            self.notify.notify_one();
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<Item> {
        let mut q = self.inner.lock();
        let item = q.pop_front();
        self.depth.store(q.len(), Ordering::Relaxed);
        item
    }

    /// Pop with a bounded wait. Consumers call this in a loop so a shutdown
    /// signal is observed within one `wait` period at worst.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<Item> {
        if let Some(item) = self.try_pop() {
            return Some(item);
        }
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        self.try_pop()
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Returns how many items were discarded; the caller
    /// logs and counts the loss (watermark policy is lossy by design).
    pub fn clear(&self) -> usize {
        let mut q = self.inner.lock();
        let dropped = q.len();
        q.clear();
        self.depth.store(0, Ordering::Relaxed);
        dropped
    }

    /// Take everything currently queued, preserving order. Used by the
    /// shutdown flush.
    pub fn drain(&self) -> Vec<Item> {
        let mut q = self.inner.lock();
        let items: Vec<Item> = q.drain(..).collect();
        self.depth.store(0, Ordering::Relaxed);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn item(id: &str) -> Item {
        Item::new(id, "test")
    }

    #[test]
    fn fifo_order_and_depth() {
        let q = IngestionQueue::new();
        q.push(item("a"));
        q.push_all(vec![item("b"), item("c")]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_pop().unwrap().id, "a");
        assert_eq!(q.try_pop().unwrap().id, "b");
        assert_eq!(q.try_pop().unwrap().id, "c");
        assert!(q.try_pop().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn clear_reports_dropped_count() {
        let q = IngestionQueue::new();
        for i in 0..5 {
            q.push(item(&format!("i{i}")));
        }
        assert_eq!(q.clear(), 5);
        assert_eq!(q.len(), 0);
        assert_eq!(q.clear(), 0);
    }

    #[tokio::test]
    async fn pop_timeout_returns_none_on_empty() {
        let q = IngestionQueue::new();
        let got = q.pop_timeout(Duration::from_millis(10)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn pop_timeout_wakes_on_push() {
        let q = std::sync::Arc::new(IngestionQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.pop_timeout(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(item("x"));
        let got = waiter.await.unwrap();
        assert_eq!(got.unwrap().id, "x");
    }
}
