// src/plugin.rs
// Plugin contracts: streams produce items, storages persist them, filters
// and processors sit in between. All implementations live behind a
// string-keyed registry (see plugins::PluginRegistry) so deployments pick
// implementations by name in the config file.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::item::{Feed, Item};

/// Flat key→value parameter map handed to plugin factories.
pub type PluginParams = HashMap<String, String>;

/// An external sink that persists or indexes items. Treated as an opaque,
/// independently-failing collaborator: a failing call is logged and ignored
/// for that call, and only the periodic health check moves a storage in or
/// out of the active set.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Establish whatever connection the backend needs. `false` means the
    /// backend is reachable but not usable yet.
    async fn open(&self) -> Result<bool>;

    async fn store(&self, item: &Item) -> Result<()>;

    async fn update(&self, item: &Item) -> Result<()>;

    /// Returns whether the id existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Health probe. Infallible by contract: an unreachable backend is
    /// simply unhealthy, not an error.
    async fn check_status(&self) -> bool;

    async fn close(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// A source adapter for one external network or protocol, polled for items
/// given a feed set. Configuration arrives through the factory that built
/// the instance; `open` performs any connection setup.
#[async_trait]
pub trait Stream: Send + Sync {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Retrieve items for the given feeds. The fetch task calls this with
    /// one feed at a time so a failing feed cannot take down the rest.
    async fn poll(&self, feeds: &[Feed]) -> Result<Vec<Item>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Consumer-side gate: the first filter that rejects an item drops it
/// before it reaches any storage. Rejection is an intentional, counted
/// drop, not an error.
pub trait ItemFilter: Send + Sync {
    fn accept(&self, item: &Item) -> bool;

    fn name(&self) -> &str;
}

/// Consumer-side enrichment: may mutate the item in place, never rejects.
pub trait Processor: Send + Sync {
    fn process(&self, item: &mut Item);

    fn name(&self) -> &str;
}
