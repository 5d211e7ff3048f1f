//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the ingestion pipeline and the
//! responder need from a backend, enabling both the in-memory store here and
//! the SQLite store in the app crate.
//!
//! Records are never mutated once written. A new build replaces the old one
//! wholesale inside [`add_records`](VectorStore::add_records), so the
//! previous build stays readable until its successor is complete.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IndexedRecord, ScoredChunk};
use crate::search::MetadataFilter;

/// Summary of a store's contents, used by `inspect` and `/health`-style
/// reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreInfo {
    pub records: usize,
    pub complete: bool,
    /// Unix seconds when the build was marked complete.
    pub built_at: Option<i64>,
    pub embedding_model: Option<String>,
    pub dims: Option<usize>,
}

/// Identifies the build written by [`VectorStore::add_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub embedding_model: String,
    pub dims: usize,
    pub built_at: i64,
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_records`](VectorStore::add_records) | Replace the contents with a build and mark it complete |
/// | [`is_populated`](VectorStore::is_populated) | Build/load decision |
/// | [`search`](VectorStore::search) | k-NN with exact-match filter |
/// | [`count`](VectorStore::count) | Number of records |
/// | [`clear`](VectorStore::clear) | Drop every record and the completion marker |
/// | [`info`](VectorStore::info) | Summary for inspection |
/// | [`sample`](VectorStore::sample) | First records by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace whatever the store holds with `records` and mark it complete,
    /// atomically: on error the previous contents and marker are untouched.
    async fn add_records(&self, records: &[IndexedRecord], build: &BuildInfo) -> Result<()>;

    /// True when a complete build is present.
    async fn is_populated(&self) -> Result<bool>;

    /// Up to `k` records by descending cosine similarity to `query`, ties
    /// by ascending id. `k == 0`, an empty store, or a filter matching
    /// nothing yield an empty vector.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    async fn info(&self) -> Result<StoreInfo>;

    async fn sample(&self, limit: usize) -> Result<Vec<IndexedRecord>>;
}
