//! SSE output of the retrieval and synthesis pipelines.

use std::sync::Arc;

use futures::StreamExt;
use kb_backend::MemoryBackend;
use kb_core::{Chunk, KbConfig};
use kb_server::{KnowledgeService, SearchParams, SynthesisParams, DONE};
use serde_json::Value;

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::new("1", "La toiture en ardoise demande une pente minimale")
            .with_source("https://docs.example/toiture.pdf", Some("Toitures"))
            .with_hash("9f2c"),
        Chunk::new("2", "L'isolation de la toiture se pose sous les chevrons")
            .with_source("https://docs.example/isolation", Some("Isolation")),
        Chunk::new("3", "Principes de ventilation des combles"),
    ]
}

fn config() -> KbConfig {
    let mut config = KbConfig::default();
    config.streaming.pacing_delay_ms = 1;
    config.streaming.chunk_size = 16;
    config.sources.fileserver_base = Some("http://files:7700".to_string());
    config
}

fn service() -> KnowledgeService {
    let backend = Arc::new(MemoryBackend::from_chunks(corpus()));
    KnowledgeService::with_memory_backend(backend, &config()).unwrap()
}

fn payload(frame: &str) -> Option<Value> {
    let json = frame.strip_prefix("data: ")?.strip_suffix("\n\n")?;
    serde_json::from_str(json).ok()
}

fn reasoning(frames: &[String]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| payload(f))
        .filter_map(|v| v["choices"][0]["delta"]["reasoning_content"].as_str().map(String::from))
        .collect()
}

fn content(frames: &[String]) -> String {
    frames
        .iter()
        .filter_map(|f| payload(f))
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retrieval_stream() {
    let frames: Vec<String> = service()
        .stream_retrieval(SearchParams::new("la toiture"))
        .unwrap()
        .collect()
        .await;

    assert_eq!(frames.last().map(String::as_str), Some(DONE));
    assert_eq!(frames.iter().filter(|f| f.as_str() == DONE).count(), 1);

    let steps = reasoning(&frames);
    assert_eq!(steps[0], "Normalized query: le toiture");
    assert!(steps.iter().any(|s| s.starts_with("Found ")));

    let body = content(&frames);
    assert!(body.contains("la toiture") || body.contains("La toiture"));
    assert!(body.contains("**Sources:**"));
    assert!(body.contains("[Toitures](http://files:7700/download/9f2c)"));

    // One id for the whole message
    let ids: Vec<String> = frames
        .iter()
        .filter_map(|f| payload(f))
        .map(|v| v["id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(ids.iter().all(|id| id == &ids[0] && id.starts_with("chatcmpl-")));

    let stops = frames
        .iter()
        .filter_map(|f| payload(f))
        .filter(|v| v["choices"][0]["finish_reason"] == "stop")
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_synthesis_stream_uses_fallback_queries() {
    let params = SynthesisParams {
        subject: "toiture".to_string(),
        queries: Vec::new(),
    };
    let frames: Vec<String> = service().stream_synthesis(params).unwrap().collect().await;

    let steps = reasoning(&frames);
    assert!(steps.iter().any(|s| s == "Query 1/5: toiture"));
    assert!(steps.iter().any(|s| s == "Query 5/5: toiture techniques avancées"));
    assert!(steps.iter().any(|s| s.starts_with("Collected ")));

    let body = content(&frames);
    assert!(body.starts_with("# toiture\n\n## toiture\n\n"));
    assert!(body.contains("## toiture principes"));
    // Sources are numbered once per session
    assert_eq!(body.matches("1. [Toitures]").count(), 1);
    assert_eq!(frames.last().map(String::as_str), Some(DONE));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_outage_ends_with_error_frame() {
    let mut config = config();
    config.backends.elasticsearch_url = "http://127.0.0.1:1".to_string();
    config.backends.qdrant_url = "http://127.0.0.1:1".to_string();
    config.backends.ollama_url = "http://127.0.0.1:1".to_string();
    config.backends.request_timeout_secs = 2;

    let service = KnowledgeService::from_config(&config).unwrap();
    let frames: Vec<String> = service
        .stream_retrieval(SearchParams::new("toiture"))
        .unwrap()
        .collect()
        .await;

    assert_eq!(frames.len(), 4);
    let error = payload(&frames[2]).unwrap();
    let message = error["choices"][0]["delta"]["content"].as_str().unwrap();
    assert!(message.starts_with("\n\nError: Retrieval failed"));
    assert_eq!(error["choices"][0]["finish_reason"], "stop");
    assert_eq!(frames[3], DONE);
}
