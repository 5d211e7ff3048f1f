//! Retrieval ranking shared by every store backend.
//!
//! Stores score candidates however they like, then hand them to [`rank`],
//! which fixes the result order so the same index state always produces the
//! same answer:
//!
//! 1. Sort by cosine similarity (desc).
//! 2. Break ties by record id (asc).
//! 3. Truncate to `k`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Metadata, ScoredChunk};

/// Exact-match metadata filter: every entry must be present and equal.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub BTreeMap<String, serde_json::Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry filter, e.g. `semester == "1st"`.
    pub fn single(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut filter = Self::new();
        filter.0.insert(key.into(), value.into());
        filter
    }

    /// Parse CLI-style `key=value` pairs. Values are matched as strings.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Option<Self> {
        let mut filter = Self::new();
        for pair in pairs {
            let (key, value) = pair.as_ref().split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            filter
                .0
                .insert(key.to_string(), serde_json::Value::String(value.trim().to_string()));
        }
        Some(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Order candidates by score (desc) then id (asc) and keep the first `k`.
pub fn rank(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    if k == 0 {
        return Vec::new();
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            id: id.into(),
            chunk: Chunk::new(id, Metadata::new(), None),
            score,
        }
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let ranked = rank(
            vec![scored("b", 0.5), scored("c", 0.9), scored("a", 0.5)],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_rank_k_zero_and_truncation() {
        assert!(rank(vec![scored("a", 1.0)], 0).is_empty());
        assert_eq!(rank(vec![scored("a", 1.0), scored("b", 0.1)], 1).len(), 1);
    }

    #[test]
    fn test_filter_matching() {
        let mut meta = Metadata::new();
        meta.insert("semester".into(), "1st".into());
        meta.insert("topic".into(), "loops".into());
        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::single("semester", "1st").matches(&meta));
        assert!(!MetadataFilter::single("semester", "2nd").matches(&meta));
        assert!(!MetadataFilter::single("missing", "x").matches(&meta));
    }

    #[test]
    fn test_filter_from_pairs() {
        let filter = MetadataFilter::from_pairs(&["semester=1st", " topic = loops "]).unwrap();
        assert_eq!(filter.0["semester"], "1st");
        assert_eq!(filter.0["topic"], "loops");
        assert!(MetadataFilter::from_pairs(&["novalue"]).is_none());
        assert!(MetadataFilter::from_pairs(&["=x"]).is_none());
    }

    #[test]
    fn test_filter_deserializes_from_object() {
        let filter: MetadataFilter = serde_json::from_str(r#"{"semester":"1st"}"#).unwrap();
        assert_eq!(filter, MetadataFilter::single("semester", "1st"));
    }
}
