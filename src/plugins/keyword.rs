// src/plugins/keyword.rs
// Keyword whitelist filter: an item passes when its title or text contains
// at least one configured keyword (case-insensitive). An empty keyword list
// accepts everything.

use crate::item::Item;
use crate::plugin::{ItemFilter, PluginParams};

pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new(keywords: Vec<String>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// `keywords` param: comma-separated list.
    pub fn from_params(params: &PluginParams) -> Self {
        let keywords = params
            .get("keywords")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        Self::new(keywords)
    }
}

impl ItemFilter for KeywordFilter {
    fn accept(&self, item: &Item) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = item.title.to_lowercase();
        let text = item.text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| title.contains(k) || text.contains(k))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_accepts_everything() {
        let f = KeywordFilter::new(vec![]);
        assert!(f.accept(&Item::new("a", "t").with_text("anything at all")));
    }

    #[test]
    fn matching_is_case_insensitive_over_title_and_text() {
        let mut params = PluginParams::new();
        params.insert("keywords".into(), "Rust, systems".into());
        let f = KeywordFilter::from_params(&params);

        assert!(f.accept(&Item::new("a", "t").with_text("I like RUST a lot")));
        assert!(f.accept(&Item::new("b", "t").with_title("Systems programming")));
        assert!(!f.accept(&Item::new("c", "t").with_text("gardening tips")));
    }
}
