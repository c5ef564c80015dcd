//! kb-stream - Streaming execution bridge
//!
//! Runs a blocking, multi-step producer on a dedicated worker thread and
//! relays what it reports as an ordered stream of [`StreamEvent`]s, with
//! synthetic heartbeats while the producer is quiet.
//!
//! ```rust,ignore
//! use kb_stream::{Bridge, BridgeConfig};
//!
//! let stream = Bridge::new(BridgeConfig::default()).run(|emitter| {
//!     emitter.progress("step 1");
//!     Ok(42)
//! })?;
//! ```

mod bridge;
mod event;

pub use bridge::{Bridge, BridgeConfig, Emitter, EventStream, QueueMode};
pub use event::StreamEvent;
