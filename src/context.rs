//! Process-wide application context.
//!
//! Built once at startup and shared (behind `Arc`) with every command and
//! request handler. Tests build one from in-process fakes with
//! [`AppContext::new`].

use std::sync::Arc;

use anyhow::{Context as _, Result};

use rag_chat_core::embedding::Embedder;
use rag_chat_core::store::VectorStore;

use crate::config::{Config, Credentials};
use crate::embedding::create_embedder;
use crate::ingest::{ensure_index, IngestOutcome};
use crate::llm::{create_model, ChatModel};
use crate::responder::{Responder, ResponderSettings};
use crate::sqlite_store::SqliteStore;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn ChatModel>,
    pub responder: Responder,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let settings = ResponderSettings {
            k: config.retrieval.k,
            template: config.prompt_template()?,
            system_prompt: config.model.system_prompt.clone(),
        };
        let responder = Responder::new(store.clone(), embedder.clone(), model.clone(), settings);
        Ok(Self {
            config,
            store,
            embedder,
            model,
            responder,
        })
    }

    /// Open the persisted store and create the configured providers.
    pub async fn from_config(config: Config, credentials: &Credentials) -> Result<Self> {
        let store = SqliteStore::open(&config.store.dir)
            .await
            .with_context(|| format!("failed to open store at {}", config.store.dir.display()))?;
        let embedder = create_embedder(&config.embedding, credentials)?;
        let model = create_model(&config.model, credentials)?;
        Self::new(config, Arc::new(store), embedder, model)
    }

    /// [`from_config`](Self::from_config), then load the index or build it
    /// if the store is not complete.
    pub async fn ready(config: Config, credentials: &Credentials) -> Result<Self> {
        let ctx = Self::from_config(config, credentials).await?;
        match ensure_index(&ctx.config, ctx.store.as_ref(), ctx.embedder.as_ref(), false).await? {
            IngestOutcome::Loaded { records } => {
                tracing::info!(records, "loaded existing index");
            }
            IngestOutcome::Built { records, .. } => {
                tracing::info!(records, "built index");
            }
        }
        Ok(ctx)
    }
}
