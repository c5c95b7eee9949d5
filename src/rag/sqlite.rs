//! SQLite-backed chunk store.
//!
//! Embeddings live next to the chunk rows as little-endian f32 BLOBs; search
//! is brute-force cosine over all rows, which is the right trade-off at
//! single-document scale.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, ChunkStore, StoredChunk};
use crate::errors::ApiError;

pub struct SqliteChunkStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteChunkStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kb_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source_order INTEGER NOT NULL,
                start_offset INTEGER NOT NULL DEFAULT 0,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_kb_chunks_order ON kb_chunks(source_order)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
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

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source_order: row.get("source_order"),
            start_offset: row.get("start_offset"),
        }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn replace_all(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM kb_chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);

            sqlx::query(
                "INSERT INTO kb_chunks (chunk_id, content, source_order, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(chunk.source_order)
            .bind(chunk.start_offset)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, source_order, start_offset, embedding FROM kb_chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ChunkSearchResult> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored_emb = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored_emb);

                Some(ChunkSearchResult {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.source_order.cmp(&b.chunk.source_order))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn texts_in_order(&self) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query("SELECT content FROM kb_chunks ORDER BY source_order ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("content")).collect())
    }
}
