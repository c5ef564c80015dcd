//! kb-server - Knowledge pipelines over Server-Sent Events
//!
//! This crate wires the hybrid retriever to the streaming bridge and frames
//! the resulting events as OpenAI-compatible `chat.completion.chunk`
//! messages.
//!
//! # Pipelines
//!
//! - `retrieval` - Gather knowledge for one question
//! - `synthesis` - Gather knowledge for a subject across several queries

mod pipeline;
mod render;
mod service;
mod sse;

pub use pipeline::{fallback_queries, retrieval_pipeline, synthesis_pipeline};
pub use render::{sources_markdown, CompletionBody};
pub use service::{KnowledgeService, SearchParams, ServerInfo, SynthesisParams};
pub use sse::{into_sse, SseConfig, SseEncoder, DONE};
