//! Core data models that flow through the ingestion and retrieval pipeline.
//!
//! ```text
//! Document ──split──▶ Chunk ──embed──▶ IndexedRecord ──search──▶ ScoredChunk
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// String-keyed JSON metadata attached to documents and chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding the originating path or URL.
pub const SOURCE_KEY: &str = "source";

/// A raw document produced by a loader. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub raw_text: String,
    pub source_path: String,
    /// Always contains [`SOURCE_KEY`].
    pub metadata: Metadata,
}

impl Document {
    /// Build a document whose metadata holds only its source.
    pub fn new(source_path: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let mut metadata = Metadata::new();
        metadata.insert(
            SOURCE_KEY.to_string(),
            serde_json::Value::String(source_path.clone()),
        );
        Self {
            raw_text: raw_text.into(),
            source_path,
            metadata,
        }
    }

    /// Add a metadata entry, returning the document for chaining.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A span of a document sized for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
    /// Byte offset of the span in the parent document, when tracked.
    pub start_offset: Option<usize>,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: Metadata, start_offset: Option<usize>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self {
            text,
            metadata,
            start_offset,
            hash,
        }
    }

    /// The `source` metadata value, if it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }
}

/// A vector produced by an embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk and its embedding, as owned by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Embedding,
}

impl IndexedRecord {
    /// Wrap a chunk and embedding under a fresh UUID.
    pub fn new(chunk: Chunk, embedding: Embedding) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chunk,
            embedding,
        }
    }
}

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub filter: Option<crate::search::MetadataFilter>,
    pub k: usize,
}

/// A search hit: the stored chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
}

/// Hex SHA-256 of a string.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_carries_source() {
        let doc = Document::new("notes/a.md", "hello");
        assert_eq!(doc.metadata[SOURCE_KEY], "notes/a.md");
    }

    #[test]
    fn test_chunk_hash_is_content_derived() {
        let a = Chunk::new("same", Metadata::new(), None);
        let b = Chunk::new("same", Metadata::new(), Some(4));
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, Chunk::new("other", Metadata::new(), None).hash);
    }

    #[test]
    fn test_record_ids_unique() {
        let chunk = Chunk::new("x", Metadata::new(), None);
        let a = IndexedRecord::new(chunk.clone(), Embedding::new(vec![1.0]));
        let b = IndexedRecord::new(chunk, Embedding::new(vec![1.0]));
        assert_ne!(a.id, b.id);
    }
}
