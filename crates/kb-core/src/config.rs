//! Configuration types for the knowledge retriever.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KbError, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbConfig {
    /// External service endpoints.
    #[serde(default)]
    pub backends: BackendConfig,

    /// Hybrid retrieval parameters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Query normalization.
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Streaming bridge and delivery.
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Source link resolution.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Elasticsearch base URL.
    #[serde(default = "default_elasticsearch_url")]
    pub elasticsearch_url: String,

    /// Elasticsearch index holding lemmatized chunk text.
    #[serde(default = "default_elasticsearch_index")]
    pub elasticsearch_index: String,

    /// Qdrant base URL.
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection holding chunk vectors and payloads.
    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    /// Ollama base URL for embeddings.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Embedding model name.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            elasticsearch_url: default_elasticsearch_url(),
            elasticsearch_index: default_elasticsearch_index(),
            qdrant_url: default_qdrant_url(),
            qdrant_collection: default_qdrant_collection(),
            ollama_url: default_ollama_url(),
            embed_model: default_embed_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Hybrid retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from each signal.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,

    /// Results kept after fusion.
    #[serde(default = "default_final_k")]
    pub final_k: usize,

    /// Weight of the lexical signal.
    #[serde(default = "default_weight")]
    pub lexical_weight: f64,

    /// Weight of the vector signal.
    #[serde(default = "default_weight")]
    pub vector_weight: f64,

    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_k: default_final_k(),
            lexical_weight: default_weight(),
            vector_weight: default_weight(),
            rrf_k: default_rrf_k(),
        }
    }
}

/// Query normalization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Optional `lemma<TAB>form` dictionary replacing the built-in table.
    ///
    /// The built-in table only covers French function words and auxiliaries,
    /// so content words such as `normes` pass through unchanged. Deployments
    /// whose lexical index holds fully lemmatized text should load a complete
    /// table here, or plural and inflected forms will not match it.
    #[serde(default)]
    pub lemma_path: Option<PathBuf>,
}

/// Streaming bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Silence after which a heartbeat is emitted, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: f64,

    /// Length of one bounded queue wait, in milliseconds.
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for the worker thread after the last event, in milliseconds.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Delay between content frames of a large payload, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_delay_ms: u64,

    /// Characters per content frame.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Bound of the worker queue; unbounded when unset.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Model name reported in stream frames.
    #[serde(default = "default_model_name")]
    pub model_name: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_secs(),
            poll_interval_ms: default_poll_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            pacing_delay_ms: default_pacing_ms(),
            chunk_size: default_chunk_size(),
            queue_capacity: None,
            model_name: default_model_name(),
        }
    }
}

impl StreamingConfig {
    /// Heartbeat interval; fails when the value is not a representable positive duration.
    pub fn heartbeat_interval(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.heartbeat_interval_secs) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            _ => Err(KbError::config(format!(
                "streaming.heartbeat_interval_secs must be a positive duration, got {}",
                self.heartbeat_interval_secs
            ))),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

/// Source link resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// File server serving original PDFs by hash.
    #[serde(default)]
    pub fileserver_base: Option<String>,
}

// Default value functions

fn default_elasticsearch_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_elasticsearch_index() -> String {
    "btp_bm25_v2_index".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_qdrant_collection() -> String {
    "btp_rag_docs_v2".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embed_model() -> String {
    "embeddinggemma".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_candidate_k() -> usize {
    8
}

fn default_final_k() -> usize {
    5
}

fn default_weight() -> f64 {
    0.5
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_heartbeat_secs() -> f64 {
    10.0
}

fn default_poll_ms() -> u64 {
    100
}

fn default_join_timeout_ms() -> u64 {
    1000
}

fn default_pacing_ms() -> u64 {
    10
}

fn default_chunk_size() -> usize {
    5
}

fn default_model_name() -> String {
    "rag-hybrid".to_string()
}

impl KbConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KbError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("kb").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("kb.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Override service endpoints from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let backends = &mut self.backends;
        let targets: [(&str, &mut String); 5] = [
            ("ELASTICSEARCH_URL", &mut backends.elasticsearch_url),
            ("ELASTICSEARCH_INDEX", &mut backends.elasticsearch_index),
            ("QDRANT_URL", &mut backends.qdrant_url),
            ("QDRANT_COLLECTION", &mut backends.qdrant_collection),
            ("OLLAMA_BASE_URL", &mut backends.ollama_url),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
        if let Some(base) = lookup("FILESERVER_BASE").filter(|v| !v.is_empty()) {
            self.sources.fileserver_base = Some(base);
        }
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        for (name, weight) in [("lexical_weight", r.lexical_weight), ("vector_weight", r.vector_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(KbError::config(format!(
                    "retrieval.{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if !r.rrf_k.is_finite() || r.rrf_k <= 0.0 {
            return Err(KbError::config("retrieval.rrf_k must be positive"));
        }
        if r.final_k == 0 {
            return Err(KbError::config("retrieval.final_k must be at least 1"));
        }

        let s = &self.streaming;
        s.heartbeat_interval()?;
        if s.poll_interval_ms == 0 {
            return Err(KbError::config("streaming.poll_interval_ms must be positive"));
        }
        if s.pacing_delay_ms == 0 {
            return Err(KbError::config("streaming.pacing_delay_ms must be positive"));
        }
        if s.chunk_size == 0 {
            return Err(KbError::config("streaming.chunk_size must be at least 1"));
        }
        if s.queue_capacity == Some(0) {
            return Err(KbError::config("streaming.queue_capacity must be at least 1"));
        }
        Ok(())
    }
}
