//! Vector search adapter.

use std::sync::Arc;

use tracing::debug;

use kb_core::{CandidateHit, EmbeddingService, KbError, Result, SearchMethod, VectorIndex};

/// Embeds the raw query and queries the nearest-neighbor index.
#[derive(Clone)]
pub struct VectorSearch {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
}

impl VectorSearch {
    pub fn new(embedder: Arc<dyn EmbeddingService>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Return up to `limit` hits, closest first, with payloads when the
    /// index sent them.
    ///
    /// Embedding failures surface as `Embedding`, index failures as
    /// `IndexQuery`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateHit>> {
        let vector = self.embedder.embed(query).await.map_err(|e| match e {
            KbError::Embedding { .. } => e,
            other => KbError::embedding(other.to_string()),
        })?;

        let neighbors = self
            .index
            .nearest_neighbors(&vector, limit)
            .await
            .map_err(|e| match e {
                KbError::IndexQuery { .. } => e,
                other => KbError::index_query(other.to_string()),
            })?;

        let hits: Vec<CandidateHit> = neighbors
            .into_iter()
            .take(limit)
            .map(|n| CandidateHit {
                id: n.id,
                raw_score: n.score,
                method: SearchMethod::Vector,
                payload: n.payload,
            })
            .collect();

        debug!("Vector search returned {} hits ({} dims)", hits.len(), vector.len());
        Ok(hits)
    }
}
