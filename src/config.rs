// src/config.rs
// TOML configuration: scheduler/pipeline/api settings plus the named plugin
// sections (streams, storages, filters, processors). Each plugin entry is a
// kind identifier and a flat string parameter map, resolved through the
// registry at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::item::Feed;
use crate::plugin::PluginParams;

const ENV_PATH: &str = "STREAMHUB_CONFIG";
const DEFAULT_PATH: &str = "config/streamhub.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    pub fetch_period_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            fetch_period_secs: 15 * 60,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn fetch_period(&self) -> Duration {
        Duration::from_secs(self.fetch_period_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub consumers: usize,
    pub watermark: usize,
    pub health_interval_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            consumers: 8,
            watermark: 10_000,
            health_interval_secs: 120,
        }
    }
}

impl PipelineSection {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// One configured plugin: implementation kind plus its parameter map.
/// Streams additionally carry an instance id and an initial feed set.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub params: PluginParams,
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

impl PluginEntry {
    /// Stream id: explicit `id`, falling back to the kind.
    pub fn stream_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineSection,
    pub api: ApiConfig,
    pub streams: Vec<PluginEntry>,
    pub storages: Vec<PluginEntry>,
    pub filters: Vec<PluginEntry>,
    pub processors: Vec<PluginEntry>,
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load using env var + fallback:
    /// 1) $STREAMHUB_CONFIG
    /// 2) config/streamhub.toml
    /// 3) built-in defaults (no plugins)
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            return Self::from_path(&pb);
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::from_path(&default);
        }
        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.watermark == 0 {
            return Err(anyhow!("pipeline.watermark must be positive"));
        }
        if self.scheduler.tick_secs == 0 {
            return Err(anyhow!("scheduler.tick_secs must be positive"));
        }
        if self.storages.is_empty() {
            tracing::warn!("no storages configured, items will be dropped after processing");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[scheduler]
tick_secs = 5
fetch_period_secs = 60

[pipeline]
consumers = 4
watermark = 500
health_interval_secs = 30

[api]
bind = "0.0.0.0:9000"

[[streams]]
id = "rss-news"
kind = "rss"
[streams.params]
url = "https://example.org/feed.xml"
[[streams.feeds]]
id = "f1"
query = { type = "keywords", values = ["rust"] }

[[storages]]
kind = "memory"

[[filters]]
kind = "keyword"
[filters.params]
keywords = "rust"

[[processors]]
kind = "normalize"
"#;

    #[test]
    fn parses_full_sample() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.scheduler.tick(), Duration::from_secs(5));
        assert_eq!(cfg.pipeline.consumers, 4);
        assert_eq!(cfg.api.bind, "0.0.0.0:9000");

        assert_eq!(cfg.streams.len(), 1);
        let stream = &cfg.streams[0];
        assert_eq!(stream.stream_id(), "rss-news");
        assert_eq!(stream.params.get("url").unwrap(), "https://example.org/feed.xml");
        assert_eq!(stream.feeds[0].id, "f1");

        assert_eq!(cfg.storages[0].kind, "memory");
        assert_eq!(cfg.filters[0].kind, "keyword");
        assert_eq!(cfg.processors[0].kind, "normalize");
    }

    #[test]
    fn defaults_when_sections_missing() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.scheduler.fetch_period(), Duration::from_secs(900));
        assert_eq!(cfg.pipeline.watermark, 10_000);
        assert!(cfg.streams.is_empty());
    }

    #[test]
    fn zero_watermark_is_rejected() {
        let mut file = tempfile_path("bad_watermark.toml");
        writeln!(file.1, "[pipeline]\nwatermark = 0").unwrap();
        let err = Config::from_path(&file.0);
        assert!(err.is_err());
    }

    #[serial_test::serial]
    #[test]
    fn load_default_prefers_env_path() {
        let mut file = tempfile_path("env_config.toml");
        writeln!(file.1, "[scheduler]\ntick_secs = 3").unwrap();

        std::env::set_var(ENV_PATH, file.0.display().to_string());
        let cfg = Config::load_default().unwrap();
        assert_eq!(cfg.scheduler.tick(), Duration::from_secs(3));

        std::env::set_var(ENV_PATH, "/nonexistent/streamhub.toml");
        assert!(Config::load_default().is_err());
        std::env::remove_var(ENV_PATH);
    }

    fn tempfile_path(name: &str) -> (PathBuf, fs::File) {
        let dir = std::env::temp_dir().join("streamhub-config-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        (path, file)
    }
}
