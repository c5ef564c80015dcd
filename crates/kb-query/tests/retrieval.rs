//! End-to-end retrieval over the in-memory backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kb_backend::{HashEmbedder, MemoryBackend};
use kb_core::{Chunk, ChunkId, EmbeddingService, KbError, LexicalIndex, Result, SearchMethod};
use kb_query::{HybridRetriever, QueryConfig, RetrievalSession};
use kb_text::Normalizer;

struct DownLexical;

#[async_trait]
impl LexicalIndex for DownLexical {
    async fn query(&self, _text: &str, _limit: usize) -> Result<Vec<(ChunkId, f32)>> {
        Err(KbError::backend_unavailable("elasticsearch", "connection refused"))
    }
}

struct DownEmbedder;

#[async_trait]
impl EmbeddingService for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(KbError::embedding("model not found"))
    }
}

/// Records the text each signal receives before delegating to the backend.
struct RecordingLexical {
    inner: Arc<MemoryBackend>,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl LexicalIndex for RecordingLexical {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<(ChunkId, f32)>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        self.inner.query(text, limit).await
    }
}

struct RecordingEmbedder {
    inner: HashEmbedder,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EmbeddingService for RecordingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(text.to_string());
        }
        self.inner.embed(text).await
    }
}

fn chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("1", "Le mur porteur reprend les charges de la toiture")
            .with_source("https://docs.example/murs.pdf", Some("Murs porteurs"))
            .with_hash("h1"),
        Chunk::new("2", "Isolation thermique par l'extérieur des façades")
            .with_source("https://docs.example/ite", Some("Isolation")),
        Chunk::new("3", "La toiture en tuiles repose sur la charpente")
            .with_source("https://docs.example/toiture.pdf", None),
        Chunk::new("4", "Fondations superficielles et semelles filantes"),
    ]
}

fn retriever(backend: Arc<MemoryBackend>) -> HybridRetriever {
    HybridRetriever::new(
        backend.clone(),
        Arc::new(backend.embedder().clone()),
        backend.clone(),
        backend,
        Normalizer::french(),
        QueryConfig::default(),
    )
}

#[tokio::test]
async fn test_hybrid_search_ranks_and_hydrates() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let results = retriever(backend).search("la toiture").await.unwrap();

    assert_eq!(results.normalized_query, "le toiture");
    assert!(results.degraded.is_none());
    assert!(!results.results.is_empty());
    assert!(results.results.len() <= 5);

    let ids: Vec<&str> = results.results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert!(ids.contains(&"1"));
    assert!(ids.contains(&"3"));

    for (i, pair) in results.results.windows(2).enumerate() {
        assert!(pair[0].fused_score >= pair[1].fused_score);
        assert_eq!(pair[0].rank, i as u32 + 1);
    }
}

#[tokio::test]
async fn test_store_path_matches_payload_path() {
    let with_payloads = Arc::new(MemoryBackend::from_chunks(chunks()));
    let without_payloads = Arc::new(MemoryBackend::from_chunks(chunks()).without_payloads());

    let a = retriever(with_payloads).search("charpente toiture").await.unwrap();
    let b = retriever(without_payloads).search("charpente toiture").await.unwrap();

    let texts = |r: &kb_core::RetrievalResults| -> Vec<String> {
        r.results.iter().map(|c| c.chunk.text.clone()).collect()
    };
    assert_eq!(texts(&a), texts(&b));
}

#[tokio::test]
async fn test_lexical_outage_degrades_to_vector() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let retriever = HybridRetriever::new(
        Arc::new(DownLexical),
        Arc::new(HashEmbedder::default()),
        backend.clone(),
        backend,
        Normalizer::french(),
        QueryConfig::default(),
    );

    let results = retriever.search("isolation des façades").await.unwrap();
    assert_eq!(results.degraded, Some(SearchMethod::Lexical));
    assert_eq!(results.results[0].chunk.id.as_str(), "2");
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_lexical() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let retriever = HybridRetriever::new(
        backend.clone(),
        Arc::new(DownEmbedder),
        backend.clone(),
        backend,
        Normalizer::french(),
        QueryConfig::default(),
    );

    let results = retriever.search("semelles filantes").await.unwrap();
    assert_eq!(results.degraded, Some(SearchMethod::Vector));
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].chunk.id.as_str(), "4");
    assert_eq!(results.results[0].fused_score, 0.5 / 60.0);
}

#[tokio::test]
async fn test_both_signals_down_fails() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let retriever = HybridRetriever::new(
        Arc::new(DownLexical),
        Arc::new(DownEmbedder),
        backend.clone(),
        backend,
        Normalizer::french(),
        QueryConfig::default(),
    );

    let err = retriever.search("mur").await.unwrap_err();
    assert_eq!(err.error_code(), "RETRIEVAL_FAILED");
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let err = retriever(backend).search("   ").await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_final_k_bounds_results() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let config = QueryConfig {
        final_k: 2,
        ..QueryConfig::default()
    };
    let results = retriever(backend).search_with("toiture", &config).await.unwrap();
    assert_eq!(results.results.len(), 2);
}

#[tokio::test]
async fn test_session_numbers_sources_and_reuses_ids() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let retriever = Arc::new(retriever(backend));
    let mut session = RetrievalSession::new(retriever.clone(), Some("http://files:7700".to_string()));

    let first = session.gather("toiture").await.unwrap();
    let ids: Vec<u32> = first.sources.iter().map(|s| s.id).collect();
    let expected: Vec<u32> = (1..=ids.len() as u32).collect();
    assert_eq!(ids, expected);

    let second = session.gather("toiture").await.unwrap();
    assert_eq!(first.sources, second.sources);
    assert_eq!(session.sources().len(), first.sources.len());

    let murs = session
        .sources()
        .iter()
        .find(|s| s.title == "Murs porteurs")
        .unwrap();
    assert_eq!(murs.url, "http://files:7700/download/h1");

    let untitled = session.sources().iter().find(|s| s.url == "https://docs.example/toiture");
    assert_eq!(untitled.map(|s| s.title.as_str()), Some("Untitled document"));

    // A new session starts over at 1
    let mut other = RetrievalSession::new(retriever, None);
    let context = other.gather("fondations").await.unwrap();
    assert_eq!(context.sources[0].id, 1);
}

#[tokio::test]
async fn test_context_render_and_digest() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let mut session = RetrievalSession::new(Arc::new(retriever(backend)), None);

    let walls = session.gather("mur porteur").await.unwrap();
    let roofs = session.gather("toiture charpente").await.unwrap();

    let rendered = walls.render();
    assert!(rendered.starts_with("<knowledge id=\"1\""));
    assert_eq!(rendered.matches("</knowledge>").count(), walls.entries.len());
    assert_eq!(rendered.matches("</knowledge>\n\n<knowledge").count(), walls.entries.len() - 1);

    let digest = session.digest("Gros œuvre", vec![walls, roofs]);
    assert_eq!(digest.sections.len(), 2);
    let mut ids: Vec<u32> = digest.sources.iter().map(|s| s.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), digest.sources.len());
}

#[tokio::test]
async fn test_lexical_gets_normalized_text_and_embedder_gets_raw_query() {
    let backend = Arc::new(MemoryBackend::from_chunks(chunks()));
    let lexical = Arc::new(RecordingLexical {
        inner: backend.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let embedder = Arc::new(RecordingEmbedder {
        inner: backend.embedder().clone(),
        seen: Mutex::new(Vec::new()),
    });
    let retriever = HybridRetriever::new(
        lexical.clone(),
        embedder.clone(),
        backend.clone(),
        backend,
        Normalizer::french(),
        QueryConfig::default(),
    );

    let query = "## Les **Normes** d'isolation";
    let results = retriever.search(query).await.unwrap();

    assert_eq!(results.query, query);
    assert_eq!(*lexical.seen.lock().unwrap(), vec!["le normes de isolation".to_string()]);
    assert_eq!(*embedder.seen.lock().unwrap(), vec![query.to_string()]);
}
