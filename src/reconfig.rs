// src/reconfig.rs
// Live reconfiguration: collections come and go at runtime, each mapping to
// a set of feeds on specific streams. The transport (pub/sub, HTTP, ...) is
// the deployment's business; the core consumes a channel of structured
// messages and keeps the per-task feed reference counts in step, so a feed
// shared by two collections survives the removal of one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::item::Feed;
use crate::monitor::StreamsMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionAction {
    New,
    Stop,
    Delete,
}

/// A feed targeted at one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSpec {
    pub stream: String,
    pub feed: Feed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMessage {
    pub action: CollectionAction,
    pub collection: String,
    pub feeds: Vec<FeedSpec>,
}

/// Apply one message to the monitor. Unknown stream ids are logged and
/// skipped; the rest of the message still applies.
pub fn apply(monitor: &StreamsMonitor, msg: &CollectionMessage) {
    for spec in &msg.feeds {
        let result = match msg.action {
            CollectionAction::New => monitor.add_feed(&spec.stream, spec.feed.clone()),
            CollectionAction::Stop | CollectionAction::Delete => {
                monitor.remove_feed(&spec.stream, &spec.feed)
            }
        };
        if let Err(e) = result {
            tracing::warn!(
                collection = %msg.collection,
                stream = %spec.stream,
                feed = %spec.feed.id,
                error = ?e,
                "reconfiguration entry skipped"
            );
        }
    }
    tracing::info!(
        collection = %msg.collection,
        action = ?msg.action,
        feeds = msg.feeds.len(),
        "collection message applied"
    );
}

/// Spawn a listener draining the reconfiguration channel until it closes.
pub fn spawn_listener(
    monitor: Arc<StreamsMonitor>,
    mut rx: mpsc::Receiver<CollectionMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            apply(&monitor, &msg);
        }
        tracing::debug!("reconfiguration channel closed");
    })
}
