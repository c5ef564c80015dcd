//! Elasticsearch lexical index client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use kb_core::{BackendConfig, ChunkId, KbError, LexicalIndex, Result};

use crate::{check_status, http_client, json_id};

const BACKEND: &str = "elasticsearch";

/// Stored field carrying the chunk id shared with the vector index.
const ID_FIELD: &str = "doc_id";

/// BM25 index served by Elasticsearch.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: Option<String>,

    #[serde(rename = "_score")]
    score: Option<f32>,

    #[serde(default)]
    fields: HashMap<String, Vec<serde_json::Value>>,
}

impl Hit {
    fn chunk_id(&self) -> Option<ChunkId> {
        self.fields
            .get(ID_FIELD)
            .and_then(|values| values.first())
            .and_then(json_id)
            .or_else(|| self.id.clone().map(ChunkId::new))
    }
}

impl ElasticsearchIndex {
    /// Create a client for `index` at `base_url`.
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self> {
        let client = http_client(timeout)
            .map_err(|e| KbError::backend_unavailable(BACKEND, e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    /// Create a client from the backend configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(
            &config.elasticsearch_url,
            &config.elasticsearch_index,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn parse(body: SearchResponse) -> Vec<(ChunkId, f32)> {
        body.hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let id = hit.chunk_id()?;
                Some((id, hit.score.unwrap_or(0.0)))
            })
            .collect()
    }
}

#[async_trait]
impl LexicalIndex for ElasticsearchIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<(ChunkId, f32)>> {
        if text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = json!({
            "size": limit,
            "query": { "match": { "text": text } },
            "stored_fields": [ID_FIELD],
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::backend_unavailable(BACKEND, format!("Failed to send request: {}", e)))?;
        let response = check_status(response, |msg| KbError::backend_unavailable(BACKEND, msg)).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| KbError::backend_unavailable(BACKEND, format!("Failed to parse response: {}", e)))?;

        let hits = Self::parse(parsed);
        debug!("Elasticsearch returned {} hits", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefers_stored_doc_id() {
        let body: SearchResponse = serde_json::from_value(json!({
            "hits": { "hits": [
                { "_id": "es-1", "_score": 7.5, "fields": { "doc_id": ["chunk-a"] } },
                { "_id": "es-2", "_score": 3.0, "fields": { "doc_id": [17] } },
                { "_id": "es-3", "_score": 1.0 }
            ]}
        }))
        .unwrap();

        let hits = ElasticsearchIndex::parse(body);
        assert_eq!(
            hits,
            vec![
                (ChunkId::new("chunk-a"), 7.5),
                (ChunkId::new("17"), 3.0),
                (ChunkId::new("es-3"), 1.0),
            ]
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let index = ElasticsearchIndex::new("http://es:9200/", "docs", Duration::from_secs(1)).unwrap();
        assert_eq!(index.base_url, "http://es:9200");
    }

    #[tokio::test]
    async fn test_empty_query_skips_request() {
        // Unroutable address: any request would fail.
        let index = ElasticsearchIndex::new("http://127.0.0.1:1", "docs", Duration::from_millis(50)).unwrap();
        assert!(index.query("   ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_is_backend_unavailable() {
        let index = ElasticsearchIndex::new("http://127.0.0.1:1", "docs", Duration::from_millis(200)).unwrap();
        let err = index.query("dalle", 5).await.unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
    }
}
