//! Ingestion and retrieval against the SQLite store, with an in-process
//! embedder standing in for the remote provider.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use rag_chat::config::Config;
use rag_chat::ingest::{ensure_index, IngestOutcome};
use rag_chat::sqlite_store::SqliteStore;
use rag_chat_core::embedding::Embedder;
use rag_chat_core::models::Embedding;
use rag_chat_core::search::MetadataFilter;
use rag_chat_core::store::VectorStore;
use rag_chat_core::{RagError, Result};

/// One axis per keyword plus a constant, so every text has a direction.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        vec![
            if text.contains("loop") { 1.0 } else { 0.0 },
            if text.contains("trait") { 1.0 } else { 0.0 },
            0.1,
        ]
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Embedding::new(Self::vector(t))).collect())
    }
}

/// Fails on the second batch, after the first one succeeded.
struct FlakyEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(RagError::embedding("HTTP 500"));
        }
        Ok(texts
            .iter()
            .map(|t| Embedding::new(KeywordEmbedder::vector(t)))
            .collect())
    }
}

fn setup(extra: &str) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let first = root.join("docs").join("1-semester");
    let second = root.join("docs").join("2-semester");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    fs::write(
        first.join("topic-loops.md"),
        "# Loops\n\nA for loop repeats a block.\n\n## While\n\nA while loop checks first.",
    )
    .unwrap();
    fs::write(
        second.join("topic-loops-advanced.md"),
        "# Loops again\n\nLoop labels break outer loops.",
    )
    .unwrap();
    fs::write(
        second.join("topic-traits.md"),
        "# Traits\n\nA trait declares shared behaviour.",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
dir = "{root}/index"

[loader]
root = "{root}/docs"

[chunking]
strategy = "markdown"

[tagging]
topic_prefix = "topic-"

[[tagging.path_tags]]
key = "semester"
default = "other"
rules = [
  {{ contains = "1-semester", value = "1st" }},
  {{ contains = "2-semester", value = "2nd" }},
]

{extra}
"#,
        root = root.display(),
        extra = extra
    );
    let config: Config = toml::from_str(&config_content).unwrap();
    (tmp, config)
}

#[tokio::test]
async fn test_second_run_loads_without_reingesting() {
    let (_tmp, config) = setup("");
    let embedder = KeywordEmbedder::new();

    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    let first = ensure_index(&config, &store, &embedder, false).await.unwrap();
    assert_eq!(
        first,
        IngestOutcome::Built {
            documents: 3,
            chunks: 4,
            records: 4
        }
    );
    store.close().await;

    let calls_after_build = embedder.calls.load(Ordering::SeqCst);
    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    let second = ensure_index(&config, &store, &embedder, false).await.unwrap();
    assert_eq!(second, IngestOutcome::Loaded { records: 4 });
    assert_eq!(store.count().await.unwrap(), 4);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_build);
}

#[tokio::test]
async fn test_rebuild_replaces_records() {
    let (_tmp, config) = setup("");
    let embedder = KeywordEmbedder::new();
    let store = SqliteStore::open(&config.store.dir).await.unwrap();

    ensure_index(&config, &store, &embedder, false).await.unwrap();
    let outcome = ensure_index(&config, &store, &embedder, true).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Built { records: 4, .. }));
    assert_eq!(store.count().await.unwrap(), 4);

    let info = store.info().await.unwrap();
    assert!(info.complete);
    assert_eq!(info.embedding_model.as_deref(), Some("keyword-test"));
    assert_eq!(info.dims, Some(3));
    assert!(info.built_at.is_some());
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let (tmp, config) = setup("");
    let embedder = KeywordEmbedder::new();
    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    ensure_index(&config, &store, &embedder, false).await.unwrap();
    let before = store.info().await.unwrap();

    fs::remove_dir_all(tmp.path().join("docs")).unwrap();
    let err = ensure_index(&config, &store, &embedder, true)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Load(_)), "{}", err);

    assert!(store.is_populated().await.unwrap());
    assert_eq!(store.count().await.unwrap(), 4);
    assert_eq!(store.info().await.unwrap(), before);

    let outcome = ensure_index(&config, &store, &embedder, false).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Loaded { records: 4 });
}

#[tokio::test]
async fn test_failed_rebuild_during_embedding_keeps_previous_index() {
    let (_tmp, config) = setup("[embedding]\nbatch_size = 1\n");
    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    ensure_index(&config, &store, &KeywordEmbedder::new(), false)
        .await
        .unwrap();

    let flaky = FlakyEmbedder {
        calls: AtomicUsize::new(0),
    };
    let err = ensure_index(&config, &store, &flaky, true).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
    assert!(store.is_populated().await.unwrap());
    assert_eq!(store.count().await.unwrap(), 4);
    let info = store.info().await.unwrap();
    assert_eq!(info.embedding_model.as_deref(), Some("keyword-test"));
}

#[tokio::test]
async fn test_failed_build_leaves_store_unmarked() {
    let (_tmp, config) = setup("[embedding]\nbatch_size = 1\n");
    let embedder = FlakyEmbedder {
        calls: AtomicUsize::new(0),
    };
    let store = SqliteStore::open(&config.store.dir).await.unwrap();

    let err = ensure_index(&config, &store, &embedder, false)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
    assert!(!store.is_populated().await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);

    // The next run builds again instead of loading a partial index.
    let outcome = ensure_index(&config, &store, &KeywordEmbedder::new(), false)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Built { .. }));
}

#[tokio::test]
async fn test_semester_filter_restricts_results() {
    let (_tmp, config) = setup("");
    let embedder = KeywordEmbedder::new();
    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    ensure_index(&config, &store, &embedder, false).await.unwrap();

    let query = embedder.embed_query("loops").await.unwrap();
    let filter = MetadataFilter::single("semester", "2nd");
    let hits = store.search(&query.vector, 10, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert_eq!(hit.chunk.metadata["semester"], "2nd");
    }
    // The loop chunk outranks the trait chunk.
    assert_eq!(hits[0].chunk.metadata["topic"], "loops advanced");

    let unfiltered = store.search(&query.vector, 2, None).await.unwrap();
    assert_eq!(unfiltered.len(), 2);
    assert!(unfiltered
        .iter()
        .all(|h| h.chunk.text.to_lowercase().contains("loop")));
}

#[tokio::test]
async fn test_header_metadata_persisted() {
    let (_tmp, config) = setup("");
    let embedder = KeywordEmbedder::new();
    let store = SqliteStore::open(&config.store.dir).await.unwrap();
    ensure_index(&config, &store, &embedder, false).await.unwrap();

    let filter = MetadataFilter::single("Header 2", "While");
    let query = embedder.embed_query("loop").await.unwrap();
    let hits = store.search(&query.vector, 4, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.metadata["Header 1"], "Loops");
    assert_eq!(hits[0].chunk.metadata["header_path"], "Loops > While");
    assert_eq!(hits[0].chunk.metadata["semester"], "1st");
}
