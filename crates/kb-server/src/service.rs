//! Knowledge service: retrieval, streaming pipelines and SSE delivery.

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::info;

use kb_backend::{ElasticsearchIndex, MemoryBackend, OllamaEmbedder, QdrantIndex};
use kb_core::{
    ChunkStore, EmbeddingService, KbConfig, KbError, LexicalIndex, Result, RetrievalResults,
    VectorIndex,
};
use kb_query::{HybridRetriever, QueryConfig, RetrievalSession};
use kb_stream::{Bridge, BridgeConfig};
use kb_text::Normalizer;

use crate::pipeline::{retrieval_pipeline, synthesis_pipeline};
use crate::sse::{into_sse, SseConfig, SseEncoder};

/// Service state shared by all requests.
pub struct KnowledgeService {
    /// Hybrid retriever over the configured backends.
    retriever: Arc<HybridRetriever>,

    /// Bridge for blocking pipelines.
    bridge: Bridge,

    /// SSE delivery settings.
    sse: SseConfig,

    /// File server used to rewrite PDF links.
    fileserver_base: Option<String>,
}

/// Search request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SearchParams {
    /// The search query.
    pub query: String,

    /// Maximum number of results (default: `retrieval.final_k`).
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Candidates per signal (default: `retrieval.candidate_k`).
    #[serde(default)]
    pub candidates: Option<usize>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            candidates: None,
        }
    }
}

/// Synthesis request parameters.
#[derive(Debug, Deserialize, Serialize)]
pub struct SynthesisParams {
    /// Subject to gather knowledge about.
    pub subject: String,

    /// Search queries; the fallback set is used when empty.
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Server info.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl KnowledgeService {
    /// Create a service over the HTTP backends named in `config`.
    pub fn from_config(config: &KbConfig) -> Result<Self> {
        info!(
            "Initializing knowledge service (elasticsearch {}, qdrant {}, ollama {})",
            config.backends.elasticsearch_url, config.backends.qdrant_url, config.backends.ollama_url
        );

        let lexical = Arc::new(ElasticsearchIndex::from_config(&config.backends)?);
        let embedder = Arc::new(OllamaEmbedder::from_config(&config.backends)?);
        let qdrant = Arc::new(QdrantIndex::from_config(&config.backends)?);

        Self::assemble(lexical, embedder, qdrant.clone(), qdrant, config)
    }

    /// Create a service over an in-memory backend.
    pub fn with_memory_backend(backend: Arc<MemoryBackend>, config: &KbConfig) -> Result<Self> {
        info!("Initializing knowledge service with {} in-memory chunks", backend.len());

        let embedder = Arc::new(backend.embedder().clone());
        Self::assemble(backend.clone(), embedder, backend.clone(), backend, config)
    }

    fn assemble(
        lexical: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingService>,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn ChunkStore>,
        config: &KbConfig,
    ) -> Result<Self> {
        config.validate()?;

        let normalizer = Normalizer::from_config(&config.normalizer)?;
        let retriever = HybridRetriever::new(
            lexical,
            embedder,
            vectors,
            store,
            normalizer,
            QueryConfig::from(&config.retrieval),
        );

        Ok(Self {
            retriever: Arc::new(retriever),
            bridge: Bridge::new(BridgeConfig::from_config(&config.streaming)?),
            sse: SseConfig::from(&config.streaming),
            fileserver_base: config.sources.fileserver_base.clone(),
        })
    }

    /// Get the server info.
    pub fn info() -> ServerInfo {
        ServerInfo {
            name: "kb-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Hybrid lexical/vector knowledge retrieval with streamed pipelines".to_string(),
        }
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    /// Start a session with its own source numbering.
    pub fn session(&self) -> RetrievalSession {
        RetrievalSession::new(self.retriever.clone(), self.fileserver_base.clone())
    }

    fn query_config(&self, params: &SearchParams) -> QueryConfig {
        let defaults = self.retriever.config();
        QueryConfig {
            final_k: params.top_k.unwrap_or(defaults.final_k),
            candidate_k: params.candidates.unwrap_or(defaults.candidate_k),
            ..defaults.clone()
        }
    }

    /// Run one hybrid search.
    pub async fn search(&self, params: SearchParams) -> Result<RetrievalResults> {
        let config = self.query_config(&params);
        self.retriever.search_with(&params.query, &config).await
    }

    /// Stream the retrieval pipeline for one question as SSE frames.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream_retrieval(&self, params: SearchParams) -> Result<BoxStream<'static, String>> {
        if params.query.trim().is_empty() {
            return Err(KbError::invalid_argument("query must not be empty"));
        }
        let handle = current_handle()?;
        let config = self.query_config(&params);

        info!("Streaming retrieval for: {:?}", params.query);
        let events = self
            .bridge
            .run(retrieval_pipeline(self.session(), handle, params.query, config))?;
        Ok(into_sse(events, self.encoder(), self.sse.clone()))
    }

    /// Stream the knowledge synthesis pipeline as SSE frames.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream_synthesis(&self, params: SynthesisParams) -> Result<BoxStream<'static, String>> {
        if params.subject.trim().is_empty() {
            return Err(KbError::invalid_argument("subject must not be empty"));
        }
        let handle = current_handle()?;
        let config = self.retriever.config().clone();

        info!("Streaming synthesis for: {:?}", params.subject);
        let events = self.bridge.run(synthesis_pipeline(
            self.session(),
            handle,
            params.subject,
            params.queries,
            config,
        ))?;
        Ok(into_sse(events, self.encoder(), self.sse.clone()))
    }

    fn encoder(&self) -> SseEncoder {
        SseEncoder::new(self.sse.model_name.clone())
    }
}

fn current_handle() -> Result<Handle> {
    Handle::try_current().map_err(|e| KbError::internal(format!("no async runtime: {}", e)))
}
