//! Path-derived chunk tags.
//!
//! A [`PathTag`] maps substrings of a document's source path to a tag value,
//! e.g. `semester = "1st"` for paths containing `1-semester`. A topic can be
//! derived from the file stem (`topic-for-loops.md` → `for loops`).

use std::path::Path;

use serde::Deserialize;

use crate::models::Metadata;

/// Metadata key populated by [`derive_topic`].
pub const TOPIC_KEY: &str = "topic";

/// Default prefix stripped from file stems when deriving topics.
pub const DEFAULT_TOPIC_PREFIX: &str = "topic-";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathRule {
    pub contains: String,
    pub value: String,
}

/// A metadata key whose value is chosen from the source path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathTag {
    pub key: String,
    #[serde(default)]
    pub rules: Vec<PathRule>,
    #[serde(default)]
    pub default: Option<String>,
}

impl PathTag {
    /// Value of the first rule whose substring occurs in `source`, else the
    /// default.
    pub fn resolve(&self, source: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| source.contains(&r.contains))
            .map(|r| r.value.as_str())
            .or(self.default.as_deref())
    }
}

/// Topic from a file stem: strip `prefix` when present, `-` becomes a space.
pub fn derive_topic(source: &str, prefix: &str) -> Option<String> {
    let stem = Path::new(source).file_stem()?.to_str()?;
    let stem = stem.strip_prefix(prefix).unwrap_or(stem);
    let topic = stem.replace('-', " ");
    let topic = topic.trim();
    if topic.is_empty() {
        None
    } else {
        Some(topic.to_string())
    }
}

/// Apply every path tag (and the topic, when enabled) to `metadata`.
pub fn apply_tags(
    metadata: &mut Metadata,
    source: &str,
    tags: &[PathTag],
    topic_prefix: Option<&str>,
) {
    for tag in tags {
        if let Some(value) = tag.resolve(source) {
            metadata.insert(tag.key.clone(), value.into());
        }
    }
    if let Some(prefix) = topic_prefix {
        if let Some(topic) = derive_topic(source, prefix) {
            metadata.insert(TOPIC_KEY.to_string(), topic.into());
        }
    }
}

/// `Key: value` lines for each present key, capitalized, in `keys` order.
pub fn label_prefix(metadata: &Metadata, keys: &[String]) -> String {
    let mut out = String::new();
    for key in keys {
        let Some(value) = metadata.get(key) else {
            continue;
        };
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&capitalize(key));
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
