//! Remote embedding providers.
//!
//! Implements [`Embedder`] for:
//!
//! | Config Value | Provider | Endpoint |
//! |-------------|----------|----------|
//! | `"disabled"` | [`DisabledEmbedder`] | none, every call fails |
//! | `"openai"` | [`OpenAiEmbedder`] | `POST /v1/embeddings` |
//! | `"cohere"` | [`CohereEmbedder`] | `POST /v2/embed` |
//!
//! # Retries
//!
//! None by default. With `embedding.max_retries > 0`, HTTP 429, 5xx and
//! network errors are retried with exponential backoff (1s, 2s, 4s, ...
//! capped at 32s). Other 4xx responses fail immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use rag_chat_core::embedding::{check_batch, Embedder};
use rag_chat_core::models::Embedding;
use rag_chat_core::{RagError, Result};

use crate::config::{Credentials, EmbeddingConfig};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// Every call fails; used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Err(RagError::embedding(
            "embedding provider is disabled; set [embedding].provider",
        ))
    }
}

/// Settings shared by the HTTP providers.
struct Remote {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl Remote {
    fn new(config: &EmbeddingConfig, api_key: Option<String>, default_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::embedding(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            api_key_env: config.api_key_env().to_string(),
            model: config
                .model
                .clone()
                .ok_or_else(|| RagError::embedding("embedding.model required"))?,
            dims: config
                .dims
                .ok_or_else(|| RagError::embedding("embedding.dims required"))?,
            max_retries: config.max_retries,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::embedding(format!("{} not set", self.api_key_env)))
    }

    /// POST `body` to `path`, retrying per `max_retries`, and return the
    /// parsed JSON response.
    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| RagError::embedding(format!("invalid response: {}", e)));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err =
                        RagError::embedding(format!("API error {}: {}", status, body_text));
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(RagError::embedding(format!("request failed: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::embedding("embedding failed after retries")))
    }
}

pub struct OpenAiEmbedder {
    remote: Remote,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            remote: Remote::new(config, api_key, OPENAI_BASE_URL)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.remote.model
    }

    fn dims(&self) -> usize {
        self.remote.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.remote.model,
            "input": texts,
            "dimensions": self.remote.dims,
        });
        let json = self.remote.post("/v1/embeddings", &body).await?;
        let vectors = parse_openai_response(&json)?;
        check_batch(&vectors, texts.len(), self.remote.dims)?;
        Ok(vectors)
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiItem>,
}

#[derive(Deserialize)]
struct OpenAiItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Embedding>> {
    let mut response = OpenAiResponse::deserialize(json)
        .map_err(|e| RagError::embedding(format!("invalid OpenAI response: {}", e)))?;
    if response.data.iter().all(|d| d.index.is_some()) {
        response.data.sort_by_key(|d| d.index);
    }
    Ok(response
        .data
        .into_iter()
        .map(|d| Embedding::new(d.embedding))
        .collect())
}

pub struct CohereEmbedder {
    remote: Remote,
}

impl CohereEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            remote: Remote::new(config, api_key, COHERE_BASE_URL)?,
        })
    }

    async fn embed_as(&self, texts: &[String], input_type: &str) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.remote.model,
            "texts": texts,
            "input_type": input_type,
            "embedding_types": ["float"],
            "output_dimension": self.remote.dims,
        });
        let json = self.remote.post("/v2/embed", &body).await?;
        let vectors = parse_cohere_response(&json)?;
        check_batch(&vectors, texts.len(), self.remote.dims)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn model_name(&self) -> &str {
        &self.remote.model
    }

    fn dims(&self) -> usize {
        self.remote.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.embed_as(texts, "search_document").await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_as(&[text.to_string()], "search_query")
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding("provider returned no vector for query"))
    }
}

#[derive(Deserialize)]
struct CohereResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Deserialize)]
struct CohereEmbeddings {
    float: Vec<Vec<f32>>,
}

/// Extract `embeddings.float` (already in input order).
pub fn parse_cohere_response(json: &serde_json::Value) -> Result<Vec<Embedding>> {
    let response = CohereResponse::deserialize(json)
        .map_err(|e| RagError::embedding(format!("invalid Cohere response: {}", e)))?;
    Ok(response
        .embeddings
        .float
        .into_iter()
        .map(Embedding::new)
        .collect())
}

/// Build the configured embedder.
pub fn create_embedder(
    config: &EmbeddingConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn Embedder>> {
    let key = credentials.embedding_api_key.clone();
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config, key)?)),
        "cohere" => Ok(Arc::new(CohereEmbedder::new(config, key)?)),
        other => Err(RagError::embedding(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}
