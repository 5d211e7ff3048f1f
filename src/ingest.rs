//! Build/load decision and the ingestion pipeline.
//!
//! ```text
//! Splitter::new (validate) → load → split → embed (batches) → add_records
//! ```
//!
//! A store that is already marked complete is loaded as-is and nothing is
//! re-ingested, so repeated runs never change the record count. `rebuild`
//! only skips that check. The old contents are swapped for the new records
//! and completion marker in a single transaction, so a failed build (or
//! rebuild) leaves whatever was there before untouched.

use anyhow::Result as AnyResult;
use chrono::Utc;

use rag_chat_core::embedding::Embedder;
use rag_chat_core::models::{Chunk, Document, IndexedRecord};
use rag_chat_core::splitter::Splitter;
use rag_chat_core::store::{BuildInfo, VectorStore};
use rag_chat_core::{RagError, Result};

use crate::config::{Config, Credentials};
use crate::embedding::create_embedder;
use crate::loader;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A complete store was found and reused.
    Loaded { records: usize },
    /// The pipeline ran and the store was written.
    Built {
        documents: usize,
        chunks: usize,
        records: usize,
    },
}

/// Validate the splitter, load every source, and split.
pub async fn prepare_chunks(config: &Config) -> Result<(Vec<Document>, Vec<Chunk>)> {
    let splitter = Splitter::new(config.split_options())?;
    let docs = loader::load_all(&config.loader).await?;
    let chunks = splitter.split_all(&docs);
    tracing::info!(documents = docs.len(), chunks = chunks.len(), "split documents");
    Ok((docs, chunks))
}

/// Embed chunks in batches of `batch_size`, preserving order.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Vec<IndexedRecord>> {
    let batch_size = batch_size.max(1);
    let mut records = Vec::with_capacity(chunks.len());
    let total = chunks.len();
    let mut pending = chunks.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RagError::embedding(format!(
                "expected {} vectors, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        records.extend(
            batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedRecord::new(chunk, vector)),
        );
        tracing::debug!(embedded = records.len(), total, "embedding progress");
    }

    Ok(records)
}

/// Load the store if it is complete, otherwise run the full pipeline.
pub async fn ensure_index(
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    rebuild: bool,
) -> Result<IngestOutcome> {
    if rebuild {
        tracing::info!("rebuild requested, ignoring existing store");
    } else if store.is_populated().await? {
        let records = store.count().await?;
        tracing::info!(records, "store is complete, skipping ingestion");
        return Ok(IngestOutcome::Loaded { records });
    }

    let (docs, chunks) = prepare_chunks(config).await?;
    if chunks.is_empty() {
        return Err(RagError::load("documents produced no chunks"));
    }
    let chunk_count = chunks.len();

    let records = embed_chunks(embedder, chunks, config.embedding.batch_size).await?;

    let build = BuildInfo {
        embedding_model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        built_at: Utc::now().timestamp(),
    };
    store.add_records(&records, &build).await?;
    tracing::info!(records = records.len(), "store built");

    Ok(IngestOutcome::Built {
        documents: docs.len(),
        chunks: chunk_count,
        records: records.len(),
    })
}

/// `ragchat ingest`.
pub async fn run_ingest(
    config: &Config,
    credentials: &Credentials,
    rebuild: bool,
    dry_run: bool,
) -> AnyResult<()> {
    if dry_run {
        let (docs, chunks) = prepare_chunks(config).await?;
        println!("ingest (dry-run)");
        println!("  documents: {}", docs.len());
        println!("  chunks: {}", chunks.len());
        println!("ok");
        return Ok(());
    }

    let store = SqliteStore::open(&config.store.dir).await?;
    let embedder = create_embedder(&config.embedding, credentials)?;
    let outcome = ensure_index(config, &store, embedder.as_ref(), rebuild).await;
    store.close().await;

    match outcome? {
        IngestOutcome::Loaded { records } => {
            println!("ingest");
            println!("  store: {} (complete, reused)", config.store.dir.display());
            println!("  records: {}", records);
        }
        IngestOutcome::Built {
            documents,
            chunks,
            records,
        } => {
            println!("ingest");
            println!("  store: {}", config.store.dir.display());
            println!("  documents: {}", documents);
            println!("  chunks: {}", chunks);
            println!("  records written: {}", records);
        }
    }
    println!("ok");
    Ok(())
}
