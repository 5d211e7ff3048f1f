//! SQLite-backed [`VectorStore`].
//!
//! Lives in a directory as `index.sqlite` with two tables: `records` (one
//! row per chunk, vector as a little-endian f32 BLOB, metadata as JSON) and
//! `index_state` (build information and the completion marker).
//!
//! Search is brute-force cosine similarity over every row, then the shared
//! [`rank`] ordering.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use rag_chat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use rag_chat_core::models::{Chunk, Embedding, IndexedRecord, Metadata, ScoredChunk};
use rag_chat_core::search::{rank, MetadataFilter};
use rag_chat_core::store::{BuildInfo, StoreInfo, VectorStore};
use rag_chat_core::{RagError, Result};

use crate::{db, migrate};

const COMPLETE_KEY: &str = "complete";
const BUILT_AT_KEY: &str = "built_at";
const MODEL_KEY: &str = "embedding_model";
const DIMS_KEY: &str = "dims";

pub struct SqliteStore {
    pool: SqlitePool,
}

fn store_err(e: impl std::fmt::Display) -> RagError {
    RagError::store(e.to_string())
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open or create the index in `store_dir` and make sure the schema
    /// exists.
    pub async fn open(store_dir: &Path) -> Result<Self> {
        let pool = db::connect(store_dir).await.map_err(store_err)?;
        migrate::run_migrations(&pool).await.map_err(store_err)?;
        Ok(Self::new(pool))
    }

    /// Open an index only if one already exists; never creates files.
    pub async fn open_existing(store_dir: &Path) -> Result<Option<Self>> {
        match db::connect_existing(store_dir).await.map_err(store_err)? {
            Some(pool) => {
                migrate::run_migrations(&pool).await.map_err(store_err)?;
                Ok(Some(Self::new(pool)))
            }
            None => Ok(None),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn state_value(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM index_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    fn decode_record(row: &sqlx::sqlite::SqliteRow) -> Result<IndexedRecord> {
        let id: String = row.try_get("id").map_err(store_err)?;
        let text: String = row.try_get("text").map_err(store_err)?;
        let metadata_json: String = row.try_get("metadata_json").map_err(store_err)?;
        let start_offset: Option<i64> = row.try_get("start_offset").map_err(store_err)?;
        let hash: String = row.try_get("hash").map_err(store_err)?;
        let dims: i64 = row.try_get("dims").map_err(store_err)?;
        let blob: Vec<u8> = row.try_get("embedding").map_err(store_err)?;

        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| RagError::store(format!("record {} has corrupt metadata: {}", id, e)))?;
        let vector = blob_to_vec(&blob);
        if vector.len() as i64 != dims {
            return Err(RagError::store(format!(
                "record {} has {} dimensions, expected {}",
                id,
                vector.len(),
                dims
            )));
        }

        Ok(IndexedRecord {
            id,
            chunk: Chunk {
                text,
                metadata,
                start_offset: start_offset.and_then(|o| usize::try_from(o).ok()),
                hash,
            },
            embedding: Embedding::new(vector),
        })
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add_records(&self, records: &[IndexedRecord], build: &BuildInfo) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // The previous build disappears only when this transaction commits.
        for table in ["index_state", "records"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        for record in records {
            let metadata_json =
                serde_json::to_string(&record.chunk.metadata).map_err(store_err)?;
            sqlx::query(
                r#"
                INSERT INTO records (id, text, metadata_json, start_offset, hash, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.chunk.text)
            .bind(&metadata_json)
            .bind(record.chunk.start_offset.map(|o| o as i64))
            .bind(&record.chunk.hash)
            .bind(record.embedding.dims() as i64)
            .bind(vec_to_blob(&record.embedding.vector))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        let state = [
            (BUILT_AT_KEY, build.built_at.to_string()),
            (MODEL_KEY, build.embedding_model.clone()),
            (DIMS_KEY, build.dims.to_string()),
            (COMPLETE_KEY, "1".to_string()),
        ];
        for (key, value) in state {
            sqlx::query(
                r#"
                INSERT INTO index_state (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn is_populated(&self) -> Result<bool> {
        Ok(self.state_value(COMPLETE_KEY).await?.as_deref() == Some("1"))
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

        let rows = sqlx::query(
            "SELECT id, text, metadata_json, start_offset, hash, dims, embedding FROM records",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::decode_record(row)?;
            if let Some(f) = filter {
                if !f.matches(&record.chunk.metadata) {
                    continue;
                }
            }
            candidates.push(ScoredChunk {
                score: cosine_similarity(query, &record.embedding.vector),
                id: record.id,
                chunk: record.chunk,
            });
        }

        Ok(rank(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM index_state")
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM records")
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn info(&self) -> Result<StoreInfo> {
        Ok(StoreInfo {
            records: self.count().await?,
            complete: self.is_populated().await?,
            built_at: self
                .state_value(BUILT_AT_KEY)
                .await?
                .and_then(|v| v.parse().ok()),
            embedding_model: self.state_value(MODEL_KEY).await?,
            dims: self.state_value(DIMS_KEY).await?.and_then(|v| v.parse().ok()),
        })
    }

    async fn sample(&self, limit: usize) -> Result<Vec<IndexedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, text, metadata_json, start_offset, hash, dims, embedding
            FROM records ORDER BY id ASC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(Self::decode_record).collect()
    }
}
