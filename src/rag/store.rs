//! ChunkStore trait — abstract interface for the knowledge base index.
//!
//! One logical index exists at a time. A rebuild replaces the whole index;
//! there is no incremental upsert.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// A stored chunk with its position in the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub content: String,
    /// Position in the chunk sequence of the active index.
    pub source_order: i64,
    /// Character offset in the source document.
    pub start_offset: i64,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Atomically replace the entire index with `items`.
    ///
    /// Concurrent readers observe either the previous index or the new one,
    /// never a partial mix.
    async fn replace_all(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<(), ApiError>;

    /// Top-`limit` chunks by cosine similarity, descending; ties broken by
    /// ascending `source_order`. Empty result when no index is loaded.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    /// Number of chunks in the active index.
    async fn count(&self) -> Result<usize, ApiError>;

    /// Chunk texts in index order, for the audit sidecar.
    async fn texts_in_order(&self) -> Result<Vec<String>, ApiError>;
}
