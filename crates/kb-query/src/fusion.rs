//! Reciprocal Rank Fusion (RRF) for combining the two ranking signals.

use std::cmp::Ordering;
use std::collections::HashMap;

use kb_core::{CandidateHit, ChunkId, FusedResult, RetrievalConfig};

/// RRF smoothing constant.
/// Higher values flatten the gap between top and lower ranks.
pub const RRF_K: f64 = 60.0;

/// Per-signal weights applied to the RRF contributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            vector: 0.5,
        }
    }
}

impl From<&RetrievalConfig> for FusionWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            lexical: config.lexical_weight,
            vector: config.vector_weight,
        }
    }
}

/// Best 0-based rank of each id within one list.
///
/// The list is ranked by descending raw score; equal scores keep their
/// original order. A repeated id keeps its first (best) rank.
fn best_ranks(hits: &[CandidateHit]) -> (Vec<&ChunkId>, HashMap<&ChunkId, usize>) {
    let mut order: Vec<usize> = (0..hits.len()).collect();
    order.sort_by(|&a, &b| {
        hits[b]
            .raw_score
            .partial_cmp(&hits[a].raw_score)
            .unwrap_or(Ordering::Equal)
    });

    let mut seen = Vec::with_capacity(hits.len());
    let mut ranks = HashMap::with_capacity(hits.len());
    for (rank, idx) in order.into_iter().enumerate() {
        let id = &hits[idx].id;
        if !ranks.contains_key(id) {
            ranks.insert(id, rank);
            seen.push(id);
        }
    }
    (seen, ranks)
}

/// Fuse lexical and vector candidates using weighted Reciprocal Rank Fusion.
///
/// fused_score(id) = w_lex / (rank_lex + k) + w_vec / (rank_vec + k)
///
/// An id absent from a list contributes nothing for that list. Results are
/// sorted by fused score descending; ties keep first-seen order, lexical
/// list first. At most `final_k` results are returned.
pub fn reciprocal_rank_fusion(
    lexical: &[CandidateHit],
    vector: &[CandidateHit],
    weights: FusionWeights,
    final_k: usize,
    k: f64,
) -> Vec<FusedResult> {
    let (lexical_order, lexical_ranks) = best_ranks(lexical);
    let (vector_order, vector_ranks) = best_ranks(vector);

    let mut ids: Vec<&ChunkId> = Vec::with_capacity(lexical_order.len() + vector_order.len());
    ids.extend(lexical_order.iter().copied());
    ids.extend(
        vector_order
            .iter()
            .copied()
            .filter(|id| !lexical_ranks.contains_key(id)),
    );

    let contribution = |ranks: &HashMap<&ChunkId, usize>, id: &ChunkId, weight: f64| {
        ranks
            .get(id)
            .map(|&rank| weight / (rank as f64 + k))
            .unwrap_or(0.0)
    };

    let mut fused: Vec<FusedResult> = ids
        .into_iter()
        .map(|id| FusedResult {
            id: id.clone(),
            fused_score: contribution(&lexical_ranks, id, weights.lexical)
                + contribution(&vector_ranks, id, weights.vector),
        })
        .collect();

    // Stable sort keeps first-seen order on ties
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
    });
    fused.truncate(final_k);

    fused
}
