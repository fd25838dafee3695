// src/plugins/mod.rs
// Explicit name→factory registry: deployments pick implementations by a
// string kind in the config file, resolved once at startup. A kind that
// fails to resolve is fatal to that plugin only, never to the pipeline.

pub mod keyword;
pub mod memory;
pub mod normalize;
pub mod rss;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::plugin::{ItemFilter, PluginParams, Processor, Storage, Stream};

type StreamFactory = Box<dyn Fn(&PluginParams) -> Result<Arc<dyn Stream>> + Send + Sync>;
type StorageFactory = Box<dyn Fn(&PluginParams) -> Result<Arc<dyn Storage>> + Send + Sync>;
type FilterFactory = Box<dyn Fn(&PluginParams) -> Result<Box<dyn ItemFilter>> + Send + Sync>;
type ProcessorFactory = Box<dyn Fn(&PluginParams) -> Result<Arc<dyn Processor>> + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    streams: HashMap<String, StreamFactory>,
    storages: HashMap<String, StorageFactory>,
    filters: HashMap<String, FilterFactory>,
    processors: HashMap<String, ProcessorFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register_stream("rss", |params| {
            Ok(Arc::new(rss::RssStream::from_params(params)?) as Arc<dyn Stream>)
        });
        reg.register_storage("memory", |params| {
            Ok(Arc::new(memory::MemoryStorage::from_params(params)) as Arc<dyn Storage>)
        });
        reg.register_filter("keyword", |params| {
            Ok(Box::new(keyword::KeywordFilter::from_params(params)) as Box<dyn ItemFilter>)
        });
        reg.register_processor("normalize", |params| {
            Ok(Arc::new(normalize::NormalizeProcessor::from_params(params)) as Arc<dyn Processor>)
        });
        reg
    }

    pub fn register_stream(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&PluginParams) -> Result<Arc<dyn Stream>> + Send + Sync + 'static,
    ) {
        self.streams.insert(kind.into(), Box::new(factory));
    }

    pub fn register_storage(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&PluginParams) -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    ) {
        self.storages.insert(kind.into(), Box::new(factory));
    }

    pub fn register_filter(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&PluginParams) -> Result<Box<dyn ItemFilter>> + Send + Sync + 'static,
    ) {
        self.filters.insert(kind.into(), Box::new(factory));
    }

    pub fn register_processor(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&PluginParams) -> Result<Arc<dyn Processor>> + Send + Sync + 'static,
    ) {
        self.processors.insert(kind.into(), Box::new(factory));
    }

    pub fn build_stream(&self, kind: &str, params: &PluginParams) -> Result<Arc<dyn Stream>> {
        let factory = self
            .streams
            .get(kind)
            .ok_or_else(|| anyhow!("unknown stream kind: {kind}"))?;
        factory(params)
    }

    pub fn build_storage(&self, kind: &str, params: &PluginParams) -> Result<Arc<dyn Storage>> {
        let factory = self
            .storages
            .get(kind)
            .ok_or_else(|| anyhow!("unknown storage kind: {kind}"))?;
        factory(params)
    }

    pub fn build_filter(&self, kind: &str, params: &PluginParams) -> Result<Box<dyn ItemFilter>> {
        let factory = self
            .filters
            .get(kind)
            .ok_or_else(|| anyhow!("unknown filter kind: {kind}"))?;
        factory(params)
    }

    pub fn build_processor(&self, kind: &str, params: &PluginParams) -> Result<Arc<dyn Processor>> {
        let factory = self
            .processors
            .get(kind)
            .ok_or_else(|| anyhow!("unknown processor kind: {kind}"))?;
        factory(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_by_kind() {
        let reg = PluginRegistry::with_builtins();
        let params = PluginParams::new();

        assert!(reg.build_storage("memory", &params).is_ok());
        assert!(reg.build_filter("keyword", &params).is_ok());
        assert!(reg.build_processor("normalize", &params).is_ok());
        assert!(reg.build_storage("solr", &params).is_err());
    }

    #[test]
    fn rss_stream_requires_url() {
        let reg = PluginRegistry::with_builtins();
        let err = reg.build_stream("rss", &PluginParams::new());
        assert!(err.is_err(), "rss without a url param must not resolve");

        let mut params = PluginParams::new();
        params.insert("url".into(), "https://example.org/feed.xml".into());
        assert!(reg.build_stream("rss", &params).is_ok());
    }

    #[test]
    fn custom_registration_wins() {
        let mut reg = PluginRegistry::new();
        reg.register_filter("always-no", |_p| {
            struct Never;
            impl crate::plugin::ItemFilter for Never {
                fn accept(&self, _item: &crate::item::Item) -> bool {
                    false
                }
                fn name(&self) -> &str {
                    "always-no"
                }
            }
            Ok(Box::new(Never))
        });
        let filter = reg.build_filter("always-no", &PluginParams::new()).unwrap();
        assert!(!filter.accept(&crate::item::Item::new("x", "t")));
    }
}
