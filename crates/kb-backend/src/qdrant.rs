//! Qdrant vector index and chunk store client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use kb_core::{
    BackendConfig, Chunk, ChunkId, ChunkMetadata, ChunkStore, KbError, Neighbor, Result,
    VectorIndex,
};

use crate::{check_status, http_client, json_id};

const BACKEND: &str = "qdrant";

/// One Qdrant collection holding chunk vectors and their payloads.
///
/// Payload layout: `chunk_text`, `hash`, `metadata.source_url`,
/// `metadata.title`.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    result: Vec<RetrievedPoint>,
}

#[derive(Debug, Deserialize)]
struct RetrievedPoint {
    id: Value,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct PointPayload {
    #[serde(default)]
    chunk_text: String,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    metadata: Option<PayloadMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct PayloadMetadata {
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    title: Option<String>,
}

impl PointPayload {
    fn into_chunk(self, id: ChunkId) -> Chunk {
        let metadata = self.metadata.unwrap_or_default();
        Chunk {
            id,
            text: self.chunk_text,
            metadata: ChunkMetadata {
                source_url: metadata.source_url,
                title: metadata.title,
                hash: self.hash,
            },
        }
    }
}

/// Qdrant accepts unsigned integers or UUID strings as point ids.
fn point_id(id: &ChunkId) -> Value {
    match id.as_str().parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id.as_str()),
    }
}

impl QdrantIndex {
    /// Create a client for `collection` at `base_url`.
    pub fn new(base_url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        let client = http_client(timeout)
            .map_err(|e| KbError::backend_unavailable(BACKEND, e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    /// Create a client from the backend configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.qdrant_collection,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn neighbors(response: QueryResponse) -> Vec<Neighbor> {
        response
            .result
            .points
            .into_iter()
            .filter_map(|point| {
                let id = json_id(&point.id)?;
                let payload = point.payload.map(|p| p.into_chunk(id.clone()));
                Some(Neighbor {
                    id,
                    score: point.score,
                    payload,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let url = format!("{}/collections/{}/points/query", self.base_url, self.collection);
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::index_query(format!("Failed to send request: {}", e)))?;
        let response = check_status(response, KbError::index_query).await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| KbError::index_query(format!("Failed to parse response: {}", e)))?;

        let neighbors = Self::neighbors(parsed);
        debug!("Qdrant returned {} neighbors", neighbors.len());
        Ok(neighbors)
    }
}

#[async_trait]
impl ChunkStore for QdrantIndex {
    async fn get_by_id(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        let body = json!({
            "ids": [point_id(id)],
            "with_payload": true,
            "with_vector": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::backend_unavailable(BACKEND, format!("Failed to send request: {}", e)))?;
        let response = check_status(response, |msg| KbError::backend_unavailable(BACKEND, msg)).await?;

        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| KbError::backend_unavailable(BACKEND, format!("Failed to parse response: {}", e)))?;

        Ok(parsed.result.into_iter().next().map(|point| {
            let point_id = json_id(&point.id).unwrap_or_else(|| id.clone());
            point.payload.unwrap_or_default().into_chunk(point_id)
        }))
    }
}
