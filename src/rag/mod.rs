//! Knowledge base: document chunking, embedding, and similarity retrieval.
//!
//! This module provides:
//! - `Chunker`: two-stage document splitter (structural, then line-level)
//! - `ChunkStore`: abstract storage for embedded chunks
//! - `SqliteChunkStore`: the SQLite-backed implementation
//! - `KnowledgeBase`: build/replace and top-k search over the active index

mod builder;
mod chunker;
mod sqlite;
mod store;

pub use builder::{KnowledgeBase, RetrievedChunk};
pub use chunker::{Chunker, DocumentChunk};
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkSearchResult, ChunkStore, StoredChunk};
