// src/plugins/memory.rs
// In-memory storage backend. Useful as a debugging sink and as the mock of
// choice in tests: call counts are observable and health is scriptable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::item::Item;
use crate::plugin::{PluginParams, Storage};

pub struct MemoryStorage {
    name: String,
    items: Mutex<HashMap<String, Item>>,
    healthy: AtomicBool,
    /// When set, every store/update/delete call fails. Lets tests exercise
    /// the isolation path without a real broken backend.
    fail_writes: AtomicBool,
    stored: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            stored: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_params(params: &PluginParams) -> Self {
        let name = params
            .get("name")
            .cloned()
            .unwrap_or_else(|| "memory".to_string());
        Self::named(name)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stored_count(&self) -> u64 {
        self.stored.load(Ordering::SeqCst)
    }

    pub fn updated_count(&self) -> u64 {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn deleted_count(&self) -> u64 {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        self.items.lock().get(id).cloned()
    }

    pub fn get_all_ids(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("storage '{}' write failure (injected)", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self) -> Result<bool> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn store(&self, item: &Item) -> Result<()> {
        self.check_writable()?;
        self.items.lock().insert(item.id.clone(), item.clone());
        self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, item: &Item) -> Result<()> {
        self.check_writable()?;
        self.items.lock().insert(item.id.clone(), item.clone());
        self.updated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let existed = self.items.lock().remove(id).is_some();
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Ok(existed)
    }

    async fn check_status(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_update_delete_roundtrip() {
        let s = MemoryStorage::named("m");
        let item = Item::new("a", "test").with_text("hello");

        s.store(&item).await.unwrap();
        assert_eq!(s.get("a").unwrap().text, "hello");

        let updated = Item::new("a", "test").with_text("edited");
        s.update(&updated).await.unwrap();
        assert_eq!(s.get("a").unwrap().text, "edited");

        assert!(s.delete("a").await.unwrap());
        assert!(!s.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let s = MemoryStorage::named("m");
        s.set_fail_writes(true);
        assert!(s.store(&Item::new("a", "test")).await.is_err());
        s.set_fail_writes(false);
        assert!(s.store(&Item::new("a", "test")).await.is_ok());
    }
}
