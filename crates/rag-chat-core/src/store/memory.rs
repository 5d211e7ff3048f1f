//! In-memory [`VectorStore`] for tests and ephemeral use.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every record.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{IndexedRecord, ScoredChunk};
use crate::search::{rank, MetadataFilter};

use super::{BuildInfo, StoreInfo, VectorStore};

#[derive(Default)]
struct State {
    records: Vec<IndexedRecord>,
    build: Option<BuildInfo>,
}

/// Ephemeral store; contents vanish with the value.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RagError {
    RagError::store("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add_records(&self, records: &[IndexedRecord], build: &BuildInfo) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        *state = State {
            records: records.to_vec(),
            build: Some(build.clone()),
        };
        Ok(())
    }

    async fn is_populated(&self) -> Result<bool> {
        Ok(self.state.read().map_err(poisoned)?.build.is_some())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(poisoned)?;
        let candidates = state
            .records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.chunk.metadata)))
            .map(|r| ScoredChunk {
                id: r.id.clone(),
                chunk: r.chunk.clone(),
                score: cosine_similarity(query, &r.embedding.vector),
            })
            .collect();
        Ok(rank(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.records.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.records.clear();
        state.build = None;
        Ok(())
    }

    async fn info(&self) -> Result<StoreInfo> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(StoreInfo {
            records: state.records.len(),
            complete: state.build.is_some(),
            built_at: state.build.as_ref().map(|b| b.built_at),
            embedding_model: state.build.as_ref().map(|b| b.embedding_model.clone()),
            dims: state.build.as_ref().map(|b| b.dims),
        })
    }

    async fn sample(&self, limit: usize) -> Result<Vec<IndexedRecord>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut records = state.records.clone();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Embedding, Metadata};

    fn record(id: &str, semester: &str, vector: Vec<f32>) -> IndexedRecord {
        let mut meta = Metadata::new();
        meta.insert("semester".into(), semester.into());
        IndexedRecord {
            id: id.into(),
            chunk: Chunk::new(format!("text {}", id), meta, Some(0)),
            embedding: Embedding::new(vector),
        }
    }

    fn build() -> BuildInfo {
        BuildInfo {
            embedding_model: "fake".into(),
            dims: 2,
            built_at: 1_700_000_000,
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .add_records(
                &[
                    record("r1", "1st", vec![1.0, 0.0]),
                    record("r2", "2nd", vec![0.0, 1.0]),
                    record("r3", "1st", vec![0.7, 0.7]),
                ],
                &build(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryStore::new();
        assert!(!store.is_populated().await.unwrap());
        assert!(store.search(&[1.0, 0.0], 4, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = seeded().await;
        let hits = store.search(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[tokio::test]
    async fn test_k_bounds() {
        let store = seeded().await;
        assert!(store.search(&[1.0, 0.0], 0, None).await.unwrap().is_empty());
        assert_eq!(store.search(&[1.0, 0.0], 50, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_filter() {
        let store = seeded().await;
        let first = MetadataFilter::single("semester", "1st");
        let hits = store.search(&[0.0, 1.0], 10, Some(&first)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.metadata["semester"] == "1st"));

        let none = MetadataFilter::single("semester", "3rd");
        assert!(store.search(&[0.0, 1.0], 10, Some(&none)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_records_replaces_previous_build() {
        let store = seeded().await;
        let next = BuildInfo {
            built_at: 1_800_000_000,
            ..build()
        };
        store
            .add_records(&[record("r9", "2nd", vec![0.0, 1.0])], &next)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.info().await.unwrap().built_at, Some(1_800_000_000));
        let hits = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].id, "r9");
    }

    #[tokio::test]
    async fn test_clear_resets_completion() {
        let store = seeded().await;
        assert!(store.is_populated().await.unwrap());
        store.clear().await.unwrap();
        assert!(!store.is_populated().await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.info().await.unwrap(), StoreInfo::default());
    }
}
