//! kb-query - Hybrid retrieval engine
//!
//! This crate combines a lexical and a vector ranking signal using
//! Reciprocal Rank Fusion (RRF), then hydrates the fused ids into chunks.
//!
//! # Features
//!
//! - Independent lexical and vector adapters with distinct failure modes
//! - Weighted RRF with deterministic tie-breaking
//! - Degraded single-signal mode when one backend is down
//! - Per-session source numbering for citations
//!
//! # Example
//!
//! ```rust,ignore
//! use kb_query::{HybridRetriever, QueryConfig};
//!
//! let retriever = HybridRetriever::new(lexical, embedder, vectors, store, normalizer, QueryConfig::default());
//! let results = retriever.search("quelles sont les normes d'isolation").await?;
//! ```

mod engine;
mod fusion;
mod lexical;
mod resolver;
mod session;
mod vector;

pub use engine::{HybridRetriever, QueryConfig};
pub use fusion::{reciprocal_rank_fusion, FusionWeights, RRF_K};
pub use lexical::LexicalSearch;
pub use resolver::ChunkResolver;
pub use session::{resolve_source_url, KnowledgeContext, KnowledgeDigest, KnowledgeEntry, RetrievalSession};
pub use vector::VectorSearch;

// Re-export for convenience
pub use kb_core::{RetrievalResults, ScoredChunk, Source};
