// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod fanout;
pub mod handler;
pub mod item;
pub mod metrics;
pub mod monitor;
pub mod plugin;
pub mod plugins;
pub mod queue;
pub mod reconfig;
pub mod task;

// ---- Re-exports for stable public API ----
pub use crate::config::Config;
pub use crate::fanout::{StorageFanout, StorageHealth};
pub use crate::handler::{HandlerStats, PipelineConfig, StorageHandler};
pub use crate::item::{Feed, FeedQuery, Item, MediaRef, Operation, WebPageRef};
pub use crate::monitor::StreamsMonitor;
pub use crate::plugin::{ItemFilter, PluginParams, Processor, Storage, Stream};
pub use crate::plugins::PluginRegistry;
pub use crate::queue::IngestionQueue;
pub use crate::reconfig::{CollectionAction, CollectionMessage, FeedSpec};
pub use crate::task::StreamFetchTask;
