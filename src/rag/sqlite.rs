//! SQLite-backed document index.
//!
//! Stores chunk text plus embedding blobs and ranks by brute-force
//! cosine similarity. Query embedding goes through the shared LLM
//! client; the index builder supplies chunk embeddings at insert time.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::index::{DocumentChunk, DocumentIndex, RetrievedChunk};
use crate::core::errors::ApiError;
use crate::llm::LlmClient;

pub struct SqliteDocumentIndex {
    pool: SqlitePool,
    embedder: Arc<dyn LlmClient>,
}

impl SqliteDocumentIndex {
    pub async fn new(db_path: PathBuf, embedder: Arc<dyn LlmClient>) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let index = Self { pool, embedder };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS doc_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Insert one chunk with its embedding. Replaces on chunk_id clash.
    pub async fn insert(&self, chunk: DocumentChunk, embedding: Vec<f32>) -> Result<(), ApiError> {
        let blob = serialize_embedding(&embedding);

        sqlx::query(
            "INSERT OR REPLACE INTO doc_chunks (chunk_id, content, source, embedding)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.content)
        .bind(&chunk.source)
        .bind(&blob)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Batch insert used by the index-build job and tests.
    pub async fn insert_batch(
        &self,
        items: Vec<(DocumentChunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO doc_chunks (chunk_id, content, source, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[async_trait]
impl DocumentIndex for SqliteDocumentIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(ApiError::internal)?;

        let rows = sqlx::query("SELECT content, source, embedding FROM doc_chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.try_get("embedding").ok()?;
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = deserialize_embedding(&embedding_bytes);

                Some(RetrievedChunk {
                    content: row.get("content"),
                    source: row.get("source"),
                    score: cosine_similarity(&query_embedding, &stored),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.max(1));

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }
}
