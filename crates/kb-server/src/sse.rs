//! OpenAI-compatible Server-Sent Events framing.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use ulid::Ulid;

use kb_core::StreamingConfig;
use kb_stream::{EventStream, StreamEvent};

use crate::render::CompletionBody;

/// Stream terminator frame.
pub const DONE: &str = "data: [DONE]\n\n";

/// Delivery parameters for completion content.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Characters per content frame.
    pub chunk_size: usize,

    /// Delay after each content frame.
    pub pacing_delay: Duration,

    /// Model name reported in frames.
    pub model_name: String,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for SseConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            pacing_delay: config.pacing_delay(),
            model_name: config.model_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChunkFrame<'a> {
    id: &'a str,
    object: &'static str,
    created: u64,
    model: &'a str,
    choices: [Choice; 1],
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    delta: Delta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Encodes frames of one completion message.
#[derive(Debug, Clone)]
pub struct SseEncoder {
    id: String,
    created: u64,
    model: String,
}

impl SseEncoder {
    /// Start a new message with a fresh `chatcmpl-` id.
    pub fn new(model: impl Into<String>) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: format!("chatcmpl-{}", Ulid::new()),
            created,
            model: model.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn frame(&self, delta: Delta, finish_reason: Option<&'static str>) -> String {
        let frame = ChunkFrame {
            id: &self.id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            choices: [Choice {
                index: 0,
                delta,
                finish_reason,
            }],
        };
        // Plain structs of strings and integers always serialize
        let json = serde_json::to_string(&frame).unwrap_or_default();
        format!("data: {}\n\n", json)
    }

    /// Progress text shown as assistant reasoning.
    pub fn progress(&self, text: &str) -> String {
        self.frame(
            Delta {
                role: Some("assistant"),
                reasoning_content: Some(text.to_string()),
                ..Delta::default()
            },
            None,
        )
    }

    /// Keep-alive frame with an empty delta.
    pub fn heartbeat(&self) -> String {
        self.frame(Delta::default(), None)
    }

    pub fn content(&self, text: &str) -> String {
        self.frame(
            Delta {
                content: Some(text.to_string()),
                ..Delta::default()
            },
            None,
        )
    }

    /// Final frame of a successful message.
    pub fn stop(&self) -> String {
        self.frame(Delta::default(), Some("stop"))
    }

    /// Error message delivered as closing content.
    pub fn error(&self, message: &str) -> String {
        self.frame(
            Delta {
                content: Some(format!("\n\nError: {}", message)),
                ..Delta::default()
            },
            Some("stop"),
        )
    }

    /// Content frames of `body`, `chunk_size` characters each, then `stop`.
    pub fn completion_frames(&self, body: &str, chunk_size: usize) -> Vec<String> {
        let chars: Vec<char> = body.chars().collect();
        let mut frames: Vec<String> = chars
            .chunks(chunk_size.max(1))
            .map(|piece| self.content(&piece.iter().collect::<String>()))
            .collect();
        frames.push(self.stop());
        frames
    }
}

/// Frames separated by the pacing delay.
fn paced(frames: Vec<String>, delay: Duration) -> BoxStream<'static, String> {
    stream::iter(frames.into_iter().enumerate())
        .then(move |(i, frame)| async move {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            frame
        })
        .boxed()
}

/// Frame bridged events as SSE, ending with exactly one [`DONE`].
pub fn into_sse<T>(events: EventStream<T>, encoder: SseEncoder, config: SseConfig) -> BoxStream<'static, String>
where
    T: CompletionBody + Send + 'static,
{
    let encoder = Arc::new(encoder);
    let frames = events.flat_map(move |event| match event {
        StreamEvent::Progress(text) => stream::once(ready(encoder.progress(&text))).boxed(),
        StreamEvent::Heartbeat => stream::once(ready(encoder.heartbeat())).boxed(),
        StreamEvent::Complete(result) => paced(
            encoder.completion_frames(&result.completion_body(), config.chunk_size),
            config.pacing_delay,
        ),
        StreamEvent::Error(message) => stream::once(ready(encoder.error(&message))).boxed(),
    });

    frames.chain(stream::once(ready(DONE.to_string()))).boxed()
}
