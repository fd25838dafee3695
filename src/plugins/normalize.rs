// src/plugins/normalize.rs
// Text normalization processor: decodes HTML entities, strips tags,
// collapses whitespace and caps length. Runs in the processor chain, so it
// mutates items in place and never rejects.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::item::Item;
use crate::plugin::{PluginParams, Processor};

const DEFAULT_MAX_CHARS: usize = 1500;

/// Normalize text: entity decode, tag strip, whitespace collapse, trim.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // Smart quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

pub struct NormalizeProcessor {
    max_chars: usize,
}

impl NormalizeProcessor {
    pub fn new() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn from_params(params: &PluginParams) -> Self {
        let max_chars = params
            .get("max_chars")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CHARS);
        Self { max_chars }
    }
}

impl Default for NormalizeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for NormalizeProcessor {
    fn process(&self, item: &mut Item) {
        item.title = normalize_text(&item.title, self.max_chars);
        item.text = normalize_text(&item.text, self.max_chars);
    }

    fn name(&self) -> &str {
        "normalize"
    }
}
