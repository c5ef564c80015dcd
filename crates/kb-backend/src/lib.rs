//! kb-backend - Backends behind the retrieval ports
//!
//! HTTP clients for the services a deployment runs next to the retriever,
//! plus an in-memory backend for tests and offline use.
//!
//! - [`ElasticsearchIndex`]: [`LexicalIndex`](kb_core::LexicalIndex) over a
//!   `match` query on the lemmatized `text` field.
//! - [`OllamaEmbedder`]: [`EmbeddingService`](kb_core::EmbeddingService) via
//!   `/api/embeddings`.
//! - [`QdrantIndex`]: [`VectorIndex`](kb_core::VectorIndex) and
//!   [`ChunkStore`](kb_core::ChunkStore) over one collection.
//! - [`MemoryBackend`]: all four ports over a list of chunks.

mod elastic;
mod memory;
mod ollama;
mod qdrant;

pub use elastic::ElasticsearchIndex;
pub use memory::{HashEmbedder, MemoryBackend};
pub use ollama::OllamaEmbedder;
pub use qdrant::QdrantIndex;

use std::time::Duration;

use kb_core::{ChunkId, Result};

/// Build a shared HTTP client with the configured request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Read a JSON id that may be either a string or an integer.
pub(crate) fn json_id(value: &serde_json::Value) -> Option<ChunkId> {
    match value {
        serde_json::Value::String(s) => Some(ChunkId::new(s.clone())),
        serde_json::Value::Number(n) => Some(ChunkId::new(n.to_string())),
        _ => None,
    }
}

/// Check the status of a response, turning failures into `make_err` errors.
pub(crate) async fn check_status<F>(response: reqwest::Response, make_err: F) -> Result<reqwest::Response>
where
    F: Fn(String) -> kb_core::KbError,
{
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(make_err(format!("HTTP {}: {}", status, body)))
}
