//! Hybrid retriever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use kb_core::{
    ChunkStore, EmbeddingService, KbError, LexicalIndex, Result, RetrievalConfig,
    RetrievalResults, SearchMethod, VectorIndex,
};
use kb_text::Normalizer;

use crate::fusion::{reciprocal_rank_fusion, FusionWeights, RRF_K};
use crate::lexical::LexicalSearch;
use crate::resolver::ChunkResolver;
use crate::vector::VectorSearch;

/// Configuration for retrieval queries.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Candidates requested from each signal.
    pub candidate_k: usize,

    /// Maximum number of fused results.
    pub final_k: usize,

    /// Per-signal RRF weights.
    pub weights: FusionWeights,

    /// RRF smoothing constant.
    pub rrf_k: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            candidate_k: 8,
            final_k: 5,
            weights: FusionWeights::default(),
            rrf_k: RRF_K,
        }
    }
}

impl From<&RetrievalConfig> for QueryConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            candidate_k: config.candidate_k,
            final_k: config.final_k,
            weights: FusionWeights::from(config),
            rrf_k: config.rrf_k,
        }
    }
}

/// Hybrid lexical + vector retriever.
///
/// Both signals run concurrently. When exactly one fails, the query
/// proceeds on the other and the result records which signal was lost;
/// when both fail, the query fails with `RetrievalFailed`.
pub struct HybridRetriever {
    lexical: LexicalSearch,
    vector: VectorSearch,
    resolver: ChunkResolver,
    normalizer: Normalizer,
    config: QueryConfig,
}

impl HybridRetriever {
    /// Create a retriever over the four collaborator ports.
    pub fn new(
        lexical_index: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingService>,
        vector_index: Arc<dyn VectorIndex>,
        store: Arc<dyn ChunkStore>,
        normalizer: Normalizer,
        config: QueryConfig,
    ) -> Self {
        Self {
            lexical: LexicalSearch::new(lexical_index),
            vector: VectorSearch::new(embedder, vector_index),
            resolver: ChunkResolver::new(store),
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Search with the retriever's own configuration.
    pub async fn search(&self, query: &str) -> Result<RetrievalResults> {
        self.search_with(query, &self.config).await
    }

    /// Search with an explicit configuration.
    pub async fn search_with(&self, query: &str, config: &QueryConfig) -> Result<RetrievalResults> {
        if query.trim().is_empty() {
            return Err(KbError::invalid_argument("query must not be empty"));
        }

        let start = Instant::now();
        info!("Searching for: {:?}", query);

        let normalized = self.normalizer.normalize(query);
        debug!("Normalized query: {:?}", normalized);

        // The vector signal embeds the raw query
        let (lexical_hits, vector_hits) = tokio::join!(
            self.lexical.search(&normalized, config.candidate_k),
            self.vector.search(query, config.candidate_k)
        );

        let (lexical_hits, vector_hits, degraded) = match (lexical_hits, vector_hits) {
            (Ok(l), Ok(v)) => (l, v, None),
            (Ok(l), Err(e)) if e.is_degradable() => {
                warn!("Vector signal failed, continuing lexical-only: {}", e);
                (l, Vec::new(), Some(SearchMethod::Vector))
            }
            (Err(e), Ok(v)) if e.is_degradable() => {
                warn!("Lexical signal failed, continuing vector-only: {}", e);
                (Vec::new(), v, Some(SearchMethod::Lexical))
            }
            (Err(l), Err(v)) => {
                return Err(KbError::RetrievalFailed {
                    lexical: l.to_string(),
                    vector: v.to_string(),
                });
            }
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => return Err(e),
        };

        debug!(
            "Lexical search returned {} hits, vector search returned {} hits",
            lexical_hits.len(),
            vector_hits.len()
        );

        let fused = reciprocal_rank_fusion(
            &lexical_hits,
            &vector_hits,
            config.weights,
            config.final_k,
            config.rrf_k,
        );
        debug!("Fused to {} results", fused.len());

        let mut payloads = HashMap::new();
        for hit in vector_hits {
            if let Some(chunk) = hit.payload {
                payloads.entry(hit.id).or_insert(chunk);
            }
        }

        let results = self.resolver.resolve(&fused, &mut payloads).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            latency_ms,
            results.len()
        );

        Ok(RetrievalResults {
            query: query.to_string(),
            normalized_query: normalized,
            degraded,
            latency_ms,
            results,
        })
    }
}
