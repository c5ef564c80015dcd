//! In-memory backend for tests and offline corpora.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use kb_core::{
    Chunk, ChunkId, ChunkStore, EmbeddingService, KbError, LexicalIndex, Neighbor, Result,
    VectorIndex,
};

/// Deterministic embedder that hashes tokens into a fixed number of buckets.
///
/// Texts sharing words land close together, which is enough to exercise the
/// vector signal without a model server.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed synchronously; the result is L2-normalized (or all zeros).
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let hash = token
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
                });
            embedding[(hash % self.dimension as u64) as usize] += 1.0;
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

struct Entry {
    chunk: Chunk,
    terms: HashMap<String, u32>,
    vector: Vec<f32>,
}

/// Chunk list serving every retrieval port.
///
/// Lexical scores use saturated term frequency; vector scores are cosine
/// similarities against [`HashEmbedder`] vectors computed at load time.
pub struct MemoryBackend {
    entries: Vec<Entry>,
    embedder: HashEmbedder,
    with_payloads: bool,
}

impl MemoryBackend {
    /// Index `chunks` with the default embedder.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self::with_embedder(chunks, HashEmbedder::default())
    }

    pub fn with_embedder(chunks: Vec<Chunk>, embedder: HashEmbedder) -> Self {
        let entries = chunks
            .into_iter()
            .map(|chunk| {
                let mut terms = HashMap::new();
                for token in tokens(&chunk.text) {
                    *terms.entry(token).or_insert(0) += 1;
                }
                let vector = embedder.vector(&chunk.text);
                Entry {
                    chunk,
                    terms,
                    vector,
                }
            })
            .collect();
        Self {
            entries,
            embedder,
            with_payloads: true,
        }
    }

    /// Load a JSON array of chunks.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let chunks: Vec<Chunk> = serde_json::from_str(&content)?;
        info!("Loaded {} chunks from {:?}", chunks.len(), path);
        Ok(Self::from_chunks(chunks))
    }

    /// Stop attaching payloads to vector neighbors, so callers must go
    /// through the chunk store.
    pub fn without_payloads(mut self) -> Self {
        self.with_payloads = false;
        self
    }

    /// The embedder whose vectors this index holds.
    pub fn embedder(&self) -> &HashEmbedder {
        &self.embedder
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lexical_score(entry: &Entry, query_terms: &[String]) -> f32 {
        query_terms
            .iter()
            .filter_map(|term| entry.terms.get(term))
            .map(|&tf| tf as f32 / (tf as f32 + 1.0))
            .sum()
    }
}

/// Sort by descending score, keeping insertion order on ties.
fn rank<T>(scored: &mut [(T, f32)]) {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
}

#[async_trait]
impl LexicalIndex for MemoryBackend {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<(ChunkId, f32)>> {
        let mut query_terms: Vec<String> = tokens(text).collect();
        query_terms.sort();
        query_terms.dedup();

        let mut scored: Vec<(ChunkId, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry.chunk.id.clone(), Self::lexical_score(entry, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        rank(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for MemoryBackend {
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != self.embedder.dimension() {
            return Err(KbError::index_query(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.embedder.dimension(),
                vector.len()
            )));
        }

        let mut scored: Vec<(&Entry, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine(vector, &entry.vector)))
            .collect();
        rank(&mut scored);

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(entry, score)| Neighbor {
                id: entry.chunk.id.clone(),
                score,
                payload: self.with_payloads.then(|| entry.chunk.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl ChunkStore for MemoryBackend {
    async fn get_by_id(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        Ok(self
            .entries
            .iter()
            .find(|entry| &entry.chunk.id == id)
            .map(|entry| entry.chunk.clone()))
    }
}
