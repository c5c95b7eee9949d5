//! Knowledge base build and retrieval.

use std::path::PathBuf;
use std::sync::Arc;

use super::chunker::Chunker;
use super::store::{ChunkStore, StoredChunk};
use crate::errors::ApiError;
use crate::llm::LlmService;

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub source_order: usize,
}

/// The active knowledge base: one document, chunked and embedded.
///
/// `build` replaces the whole index; `search` is a read against whatever
/// index is current. An empty index is a valid steady state — search simply
/// returns nothing until the first upload succeeds.
pub struct KnowledgeBase {
    store: Arc<dyn ChunkStore>,
    llm: LlmService,
    chunker: Chunker,
    sidecar_path: PathBuf,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        llm: LlmService,
        chunker: Chunker,
        sidecar_path: PathBuf,
    ) -> Self {
        Self {
            store,
            llm,
            chunker,
            sidecar_path,
        }
    }

    /// Chunk, embed and index `text` (plus any OCR-extracted image blocks),
    /// replacing the previous index. Returns the number of indexed chunks.
    ///
    /// Any failure leaves the previous index in place: the store swap is a
    /// single transaction and nothing is deleted until the new rows are
    /// ready.
    pub async fn build(&self, text: &str, images: &[String]) -> Result<usize, ApiError> {
        let mut document = text.to_string();
        for block in images {
            if !block.trim().is_empty() {
                document.push('\n');
                document.push_str(block);
            }
        }

        if document.trim().is_empty() {
            return Err(ApiError::Build("document is empty".to_string()));
        }

        let chunks: Vec<_> = self
            .chunker
            .split(&document)
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();

        if chunks.is_empty() {
            return Err(ApiError::Build("document produced no chunks".to_string()));
        }
        tracing::info!("document split into {} chunks", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .llm
            .embed(&texts)
            .await
            .map_err(|e| ApiError::Build(format!("embedding failed: {}", e)))?;

        let items: Vec<(StoredChunk, Vec<f32>)> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(order, (chunk, embedding))| {
                (
                    StoredChunk {
                        chunk_id: uuid::Uuid::new_v4().to_string(),
                        content: chunk.text.clone(),
                        source_order: order as i64,
                        start_offset: chunk.start_offset as i64,
                    },
                    embedding,
                )
            })
            .collect();

        let count = items.len();
        self.store
            .replace_all(items)
            .await
            .map_err(|e| ApiError::Build(format!("index write failed: {}", e)))?;

        self.write_sidecar(&texts)?;
        tracing::info!("knowledge base rebuilt with {} chunks", count);
        Ok(count)
    }

    /// Top-`k` chunks for `query`, best first. Returns an empty vec when no
    /// index has been built yet.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
        if self.store.count().await? == 0 {
            tracing::debug!("search before first upload; returning no context");
            return Ok(Vec::new());
        }

        let query_embedding = self
            .llm
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Generation("no query embedding returned".to_string()))?;

        let results = self.store.search(&query_embedding, k).await?;
        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                text: r.chunk.content,
                score: r.score,
                source_order: r.chunk.source_order as usize,
            })
            .collect())
    }

    pub async fn chunk_count(&self) -> Result<usize, ApiError> {
        self.store.count().await
    }

    /// Chunk texts in index order, written next to the index so the contents
    /// of the active knowledge base can be inspected without the database.
    fn write_sidecar(&self, texts: &[String]) -> Result<(), ApiError> {
        let payload = serde_json::to_string_pretty(texts).map_err(ApiError::internal)?;
        std::fs::write(&self.sidecar_path, payload)
            .map_err(|e| ApiError::Build(format!("sidecar write failed: {}", e)))?;
        Ok(())
    }
}
