//! Collaborator interfaces for the external retrieval services.
//!
//! Each port is constructed once at process start and shared by `Arc`
//! across sessions, so implementations must be `Send + Sync` and must not
//! hold per-query mutable state.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ChunkId};

/// Keyword relevance index (BM25-style).
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Query the index, returning `(id, score)` pairs ranked by relevance.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<(ChunkId, f32)>>;
}

/// Text embedding service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A nearest-neighbor hit with optional payload.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Backend identifier.
    pub id: ChunkId,

    /// Similarity score (higher is closer).
    pub score: f32,

    /// Stored payload, when the index returns it with the hit.
    pub payload: Option<Chunk>,
}

/// Nearest-neighbor vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Find the `limit` nearest neighbors of `vector`, closest first.
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>>;
}

/// Object store holding chunk text and metadata.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch a chunk by id; `Ok(None)` when the id is unknown.
    async fn get_by_id(&self, id: &ChunkId) -> Result<Option<Chunk>>;
}
