//! Error taxonomy for the ingestion and retrieval pipeline.

use thiserror::Error;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, RagError>;

/// Pipeline errors, one variant per stage.
#[derive(Debug, Error)]
pub enum RagError {
    /// No matching source documents, missing path, or unreachable page.
    #[error("load error: {0}")]
    Load(String),

    /// Invalid splitter configuration. Malformed document structure never
    /// produces this; it degrades instead.
    #[error("split error: {0}")]
    Split(String),

    /// Remote embedding call failed or returned an unusable response.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Remote language-model call failed.
    #[error("model error: {0}")]
    Model(String),

    /// Persisted store unreadable, corrupt, or a write failed.
    #[error("store error: {0}")]
    Store(String),

    /// The caller supplied something the pipeline cannot act on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    pub fn split(message: impl Into<String>) -> Self {
        Self::Split(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
