// src/fanout.rs
// The registered storage set with its binary health partition. A storage is
// either active (receives every item) or eliminated (receives nothing);
// only the periodic health check flips the partition, never a single
// failed call. Dispatch works off a snapshot taken under the read lock so
// one consistent view covers all storages of one dispatch call.

use std::sync::Arc;

use anyhow::{bail, Result};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;

use crate::item::{Item, Operation};
use crate::plugin::Storage;

struct StorageEntry {
    storage: Arc<dyn Storage>,
    healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub name: String,
    pub healthy: bool,
}

#[derive(Default)]
pub struct StorageFanout {
    entries: RwLock<Vec<StorageEntry>>,
}

impl StorageFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage. New registrations start active; the next health
    /// check corrects that if the backend is down.
    pub fn register(&self, storage: Arc<dyn Storage>) -> Result<()> {
        let name = storage.name().to_string();
        self.insert(storage, true)?;
        tracing::info!(storage = %name, "storage registered");
        Ok(())
    }

    /// Register a storage in the eliminated state, e.g. after a failed
    /// `open()`. The health loop readmits it once it reports healthy.
    pub fn register_eliminated(&self, storage: Arc<dyn Storage>) -> Result<()> {
        let name = storage.name().to_string();
        self.insert(storage, false)?;
        tracing::warn!(storage = %name, "storage registered as eliminated");
        Ok(())
    }

    /// Names must be unique: health verdicts and removal address storages
    /// by name, so a second storage under the same name would share one
    /// health bit.
    fn insert(&self, storage: Arc<dyn Storage>, healthy: bool) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.storage.name() == storage.name()) {
            bail!("storage name already registered: {}", storage.name());
        }
        entries.push(StorageEntry { storage, healthy });
        Ok(())
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.storage.name() != name);
        before != entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Consistent snapshot of the currently active storages.
    pub fn active_snapshot(&self) -> Vec<Arc<dyn Storage>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.healthy)
            .map(|e| Arc::clone(&e.storage))
            .collect()
    }

    /// Every registered storage, active and eliminated. The health loop
    /// probes all of them.
    pub fn all_snapshot(&self) -> Vec<Arc<dyn Storage>> {
        self.entries
            .read()
            .iter()
            .map(|e| Arc::clone(&e.storage))
            .collect()
    }

    pub fn health_snapshot(&self) -> Vec<StorageHealth> {
        self.entries
            .read()
            .iter()
            .map(|e| StorageHealth {
                name: e.storage.name().to_string(),
                healthy: e.healthy,
            })
            .collect()
    }

    pub fn is_healthy(&self, name: &str) -> Option<bool> {
        self.entries
            .read()
            .iter()
            .find(|e| e.storage.name() == name)
            .map(|e| e.healthy)
    }

    /// Apply a health-check verdict. Returns the previous state, or `None`
    /// for an unknown storage. Logs only actual transitions.
    pub fn set_healthy(&self, name: &str, healthy: bool) -> Option<bool> {
        let mut entries = self.entries.write();
        let entry = entries.iter_mut().find(|e| e.storage.name() == name)?;
        let was = entry.healthy;
        entry.healthy = healthy;
        drop(entries);

        if was != healthy {
            if healthy {
                tracing::info!(storage = name, "storage readmitted to active set");
            } else {
                tracing::warn!(storage = name, "storage eliminated from active set");
            }
        }
        metrics::gauge!("storage_healthy", "storage" => name.to_string())
            .set(if healthy { 1.0 } else { 0.0 });
        Some(was)
    }

    /// Deliver one item to every active storage by operation tag. One
    /// storage's failure is logged and never affects delivery to the rest.
    pub async fn dispatch(&self, op: Operation, item: &Item) {
        for storage in self.active_snapshot() {
            let result = match op {
                Operation::New => storage.store(item).await,
                Operation::Update => storage.update(item).await,
                Operation::Delete => storage.delete(&item.id).await.map(|_| ()),
            };
            if let Err(e) = result {
                counter!("storage_dispatch_errors_total", "storage" => storage.name().to_string())
                    .increment(1);
                tracing::warn!(
                    storage = storage.name(),
                    item = %item.id,
                    op = ?op,
                    error = ?e,
                    "storage dispatch failed, continuing with remaining storages"
                );
            }
        }
    }

    /// Fan a delete out to every active storage. Returns how many storages
    /// reported the id existed.
    pub async fn delete(&self, id: &str) -> usize {
        let mut existed = 0usize;
        for storage in self.active_snapshot() {
            match storage.delete(id).await {
                Ok(true) => existed += 1,
                Ok(false) => {}
                Err(e) => {
                    counter!("storage_dispatch_errors_total", "storage" => storage.name().to_string())
                        .increment(1);
                    tracing::warn!(storage = storage.name(), item = id, error = ?e, "delete failed");
                }
            }
        }
        existed
    }

    /// Close every registered storage, logging failures.
    pub async fn close_all(&self) {
        for storage in self.all_snapshot() {
            if let Err(e) = storage.close().await {
                tracing::warn!(storage = storage.name(), error = ?e, "storage close failed");
            }
        }
    }
}
