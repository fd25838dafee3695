// src/item.rs
// Core data model: items flowing through the pipeline and the feeds that
// parameterize what each stream fetches.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a storage should do with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    New,
    Update,
    Delete,
}

/// Reference to a media object attached to an item. The pipeline passes
/// these along without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Reference to a web page linked from an item. Uninterpreted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One unit of retrieved content. Created by a stream's retriever, read-only
/// through the pipeline except for processors, which may mutate it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// Identifier of the stream that produced this item, e.g. "rss-news".
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub operation: Operation,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<WebPageRef>,
}

impl Item {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            published_at: Utc::now(),
            operation: Operation::New,
            title: String::new(),
            text: String::new(),
            media: Vec::new(),
            pages: Vec::new(),
        }
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operation = op;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// The query half of a feed: what to ask the external network for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedQuery {
    Keywords { values: Vec<String> },
    Account { name: String },
    Location { lat: f64, lon: f64, radius_km: f64 },
    List { name: String },
}

impl FeedQuery {
    /// Flat textual form, used by streams that substitute the query into a URL.
    pub fn as_query_string(&self) -> String {
        match self {
            FeedQuery::Keywords { values } => values.join(" "),
            FeedQuery::Account { name } => name.clone(),
            FeedQuery::Location { lat, lon, radius_km } => {
                format!("{lat},{lon},{radius_km}km")
            }
            FeedQuery::List { name } => name.clone(),
        }
    }
}

/// A query descriptor owned by exactly one fetch task. Identity (equality
/// and hashing) is by `id` only: two feeds with the same id are the same
/// feed for reference-counting purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub query: FeedQuery,
}

impl Feed {
    pub fn keywords(id: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            id: id.into(),
            query: FeedQuery::Keywords { values },
        }
    }

    pub fn account(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: FeedQuery::Account { name: name.into() },
        }
    }
}

impl PartialEq for Feed {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Feed {}

impl Hash for Feed {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
