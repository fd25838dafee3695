// src/plugins/rss.rs
// Built-in RSS stream adapter. The `url` param may contain a `{query}`
// placeholder, substituted with the feed's query string, so one stream can
// serve keyword feeds against search-style endpoints.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::item::{Feed, Item, Operation, WebPageRef};
use crate::plugin::{PluginParams, Stream};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssEntry>,
}

#[derive(Debug, Deserialize)]
struct RssEntry {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Stable item id derived from the entry link (or title when unlinked).
fn entry_id(entry: &RssEntry) -> String {
    let seed = entry
        .link
        .as_deref()
        .or(entry.title.as_deref())
        .unwrap_or_default();
    let digest = Sha256::digest(seed.as_bytes());
    // First 16 bytes are plenty for identity.
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

pub struct RssStream {
    source: String,
    mode: Mode,
}

impl RssStream {
    pub fn from_params(params: &PluginParams) -> Result<Self> {
        let url = params
            .get("url")
            .cloned()
            .ok_or_else(|| anyhow!("rss stream requires a 'url' param"))?;
        let source = params.get("source").cloned().unwrap_or_else(|| "rss".into());
        Ok(Self {
            source,
            mode: Mode::Http {
                url,
                client: reqwest::Client::new(),
            },
        })
    }

    /// Parse a canned XML document instead of fetching. For tests and tools.
    pub fn from_fixture(source: impl Into<String>, xml: &str) -> Self {
        Self {
            source: source.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_items(&self, xml: &str) -> Result<Vec<Item>> {
        let rss: Rss = from_str(xml).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for entry in rss.channel.item {
            let mut item = Item::new(entry_id(&entry), self.source.clone())
                .with_operation(Operation::New)
                .with_title(entry.title.clone().unwrap_or_default())
                .with_text(entry.description.clone().unwrap_or_default());
            item.published_at = entry
                .pub_date
                .as_deref()
                .map(parse_rfc2822)
                .unwrap_or_else(Utc::now);
            if let Some(link) = entry.link {
                item.pages.push(WebPageRef {
                    url: link,
                    title: entry.title,
                });
            }
            out.push(item);
        }
        Ok(out)
    }

    fn resolve_url(template: &str, feed: &Feed) -> String {
        if template.contains("{query}") {
            template.replace("{query}", &feed.query.as_query_string())
        } else {
            template.to_string()
        }
    }
}

#[async_trait]
impl Stream for RssStream {
    async fn poll(&self, feeds: &[Feed]) -> Result<Vec<Item>> {
        let mut out = Vec::new();
        for feed in feeds {
            let body = match &self.mode {
                Mode::Fixture(xml) => xml.clone(),
                Mode::Http { url, client } => {
                    let url = Self::resolve_url(url, feed);
                    client
                        .get(&url)
                        .send()
                        .await
                        .with_context(|| format!("rss get {url}"))?
                        .text()
                        .await
                        .context("rss body")?
                }
            };
            out.extend(self.parse_items(&body)?);
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.source
    }
}
