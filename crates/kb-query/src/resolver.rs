//! Hydrates fused ids into chunks.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use kb_core::{Chunk, ChunkId, ChunkStore, FusedResult, KbError, ScoredChunk};

/// Resolves fused ids through payloads already in hand, then the store.
#[derive(Clone)]
pub struct ChunkResolver {
    store: Arc<dyn ChunkStore>,
}

impl ChunkResolver {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Resolve `fused` in order, skipping ids that cannot be found.
    ///
    /// Store failures are logged and skipped like missing ids; resolution of
    /// the remaining ids always continues.
    pub async fn resolve(
        &self,
        fused: &[FusedResult],
        payloads: &mut HashMap<ChunkId, Chunk>,
    ) -> Vec<ScoredChunk> {
        let mut resolved = Vec::with_capacity(fused.len());

        for result in fused {
            let chunk = match payloads.remove(&result.id) {
                Some(chunk) => Some(chunk),
                None => match self.store.get_by_id(&result.id).await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Failed to fetch chunk {}: {}", result.id, e);
                        None
                    }
                },
            };

            match chunk {
                Some(chunk) => resolved.push(ScoredChunk {
                    rank: 0,
                    fused_score: result.fused_score,
                    chunk,
                }),
                None => {
                    let err = KbError::ChunkNotFound {
                        id: result.id.to_string(),
                    };
                    debug!("Skipping: {}", err);
                }
            }
        }

        resolved.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
        });
        for (i, result) in resolved.iter_mut().enumerate() {
            result.rank = i as u32 + 1;
        }

        resolved
    }
}
