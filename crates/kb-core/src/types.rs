//! Core domain types for hybrid retrieval.

use serde::{Deserialize, Serialize};

/// Opaque backend identifier of a chunk.
///
/// Ids are only ever compared for equality; the lexical and vector
/// backends agree on them but nothing else may be assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The ranking signal a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Lexical,
    Vector,
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
        };
        write!(f, "{}", s)
    }
}

/// Metadata attached to a stored chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// URL of the document the chunk was cut from.
    #[serde(default)]
    pub source_url: String,

    /// Document title, if known.
    #[serde(default)]
    pub title: Option<String>,

    /// Content hash of the source file (used to build download links).
    #[serde(default)]
    pub hash: Option<String>,
}

/// A chunk of knowledge as held by the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Backend identifier.
    pub id: ChunkId,

    /// Chunk text content.
    pub text: String,

    /// Source metadata.
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk with empty metadata.
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: ChunkMetadata::default(),
        }
    }

    /// Attach source metadata.
    pub fn with_source(mut self, source_url: impl Into<String>, title: Option<&str>) -> Self {
        self.metadata.source_url = source_url.into();
        self.metadata.title = title.map(String::from);
        self
    }

    /// Attach a source content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.metadata.hash = Some(hash.into());
        self
    }
}

/// A raw hit returned by one of the search adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateHit {
    /// Backend identifier.
    pub id: ChunkId,

    /// Score as returned by the backend (scale is backend-specific).
    pub raw_score: f32,

    /// Signal that produced the hit.
    pub method: SearchMethod,

    /// Payload delivered alongside the hit, if the backend sent one.
    pub payload: Option<Chunk>,
}

impl CandidateHit {
    /// Create a hit without payload.
    pub fn new(id: impl Into<ChunkId>, raw_score: f32, method: SearchMethod) -> Self {
        Self {
            id: id.into(),
            raw_score,
            method,
            payload: None,
        }
    }
}

/// One entry of the fused ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub id: ChunkId,
    pub fused_score: f64,
}

/// A resolved chunk with its fused score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Result rank (1-indexed).
    pub rank: u32,

    /// Fused relevance score (higher is better).
    pub fused_score: f64,

    /// The hydrated chunk.
    pub chunk: Chunk,
}

/// Output of one hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResults {
    /// The original query.
    pub query: String,

    /// The query after normalization (sent to the lexical signal).
    pub normalized_query: String,

    /// The signal that failed, when the query ran in degraded mode.
    pub degraded: Option<SearchMethod>,

    /// Retrieval latency in milliseconds.
    pub latency_ms: u64,

    /// Ranked, hydrated results.
    pub results: Vec<ScoredChunk>,
}

/// A citable source surfaced within one retrieval session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Session-scoped id, starting at 1.
    pub id: u32,

    /// Display title.
    pub title: String,

    /// Resolved URL.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_opaque_string() {
        let id = ChunkId::from("42");
        assert_eq!(id.as_str(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
        assert_eq!(id, ChunkId::new(String::from("42")));
    }

    #[test]
    fn test_search_method_display() {
        assert_eq!(SearchMethod::Lexical.to_string(), "lexical");
        assert_eq!(SearchMethod::Vector.to_string(), "vector");
    }

    #[test]
    fn test_chunk_builder() {
        let chunk = Chunk::new("a", "béton armé")
            .with_source("https://example.org/doc.pdf", Some("Béton"))
            .with_hash("abc");
        assert_eq!(chunk.metadata.title.as_deref(), Some("Béton"));
        assert_eq!(chunk.metadata.hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_chunk_metadata_defaults_on_deserialize() {
        let chunk: Chunk = serde_json::from_str(r#"{"id":"x","text":"t"}"#).unwrap();
        assert_eq!(chunk.metadata, ChunkMetadata::default());
    }
}
