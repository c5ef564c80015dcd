//! Bridge between a blocking producer and an async event stream.
//!
//! The producer runs on its own OS thread and reports through an
//! [`Emitter`]. The consumer side waits on the queue in short slices so it
//! can interleave heartbeats without ever reordering producer output:
//!
//! ```text
//! worker:   Item* (Error)? Done
//! consumer: Progress* (Heartbeat interleaved) then Complete | Error
//! ```
//!
//! Dropping the stream drops the queue receiver. The worker keeps running
//! until its producer returns, but its emitter reports the disconnect.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kb_core::{KbError, Result, StreamingConfig};

use crate::event::StreamEvent;

/// Interval at which a finished stream checks whether its worker exited.
const JOIN_POLL: Duration = Duration::from_millis(5);

/// Stream of bridged events.
pub type EventStream<T> = BoxStream<'static, StreamEvent<T>>;

/// Worker queue flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// The producer never blocks on send.
    Unbounded,

    /// The producer blocks while `n` messages are waiting.
    Bounded(usize),
}

/// Timing and queue parameters of a bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Silence after which a heartbeat is emitted.
    pub heartbeat_interval: Duration,

    /// Length of one queue wait.
    pub poll_interval: Duration,

    /// How long a finished stream waits for its worker before detaching it.
    pub join_timeout: Duration,

    pub queue: QueueMode,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(1),
            queue: QueueMode::Unbounded,
        }
    }
}

impl BridgeConfig {
    /// Build from the streaming configuration section.
    pub fn from_config(config: &StreamingConfig) -> Result<Self> {
        let bridge = Self {
            heartbeat_interval: config.heartbeat_interval()?,
            poll_interval: config.poll_interval(),
            join_timeout: config.join_timeout(),
            queue: match config.queue_capacity {
                Some(n) => QueueMode::Bounded(n),
                None => QueueMode::Unbounded,
            },
        };
        bridge.validate()?;
        Ok(bridge)
    }

    /// Reject zero intervals and zero-capacity queues.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(KbError::config("heartbeat interval must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(KbError::config("poll interval must be positive"));
        }
        if self.queue == QueueMode::Bounded(0) {
            return Err(KbError::config("bounded queue capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Messages carried from the worker to the consumer.
enum Message<T> {
    Item(String),
    Error(String),
    Done(Option<T>),
}

enum Sender<T> {
    Unbounded(mpsc::UnboundedSender<Message<T>>),
    Bounded(mpsc::Sender<Message<T>>),
}

impl<T> Sender<T> {
    fn send(&self, message: Message<T>) -> bool {
        match self {
            Self::Unbounded(tx) => tx.send(message).is_ok(),
            Self::Bounded(tx) => tx.blocking_send(message).is_ok(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Self::Unbounded(tx) => tx.is_closed(),
            Self::Bounded(tx) => tx.is_closed(),
        }
    }
}

enum Receiver<T> {
    Unbounded(mpsc::UnboundedReceiver<Message<T>>),
    Bounded(mpsc::Receiver<Message<T>>),
}

impl<T> Receiver<T> {
    async fn recv(&mut self) -> Option<Message<T>> {
        match self {
            Self::Unbounded(rx) => rx.recv().await,
            Self::Bounded(rx) => rx.recv().await,
        }
    }
}

fn channel<T>(mode: QueueMode) -> (Sender<T>, Receiver<T>) {
    match mode {
        QueueMode::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        }
        QueueMode::Bounded(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        }
    }
}

/// Type-erased progress side of a worker queue.
trait Outbox: Send + Sync {
    fn push(&self, text: String) -> bool;
    fn is_closed(&self) -> bool;
}

impl<T: Send> Outbox for Sender<T> {
    fn push(&self, text: String) -> bool {
        self.send(Message::Item(text))
    }

    fn is_closed(&self) -> bool {
        Sender::is_closed(self)
    }
}

/// Handle a producer uses to report progress.
///
/// With a bounded queue, [`Emitter::progress`] blocks while the queue is
/// full, so it must not be called from inside an async runtime context.
#[derive(Clone)]
pub struct Emitter {
    outbox: Arc<dyn Outbox>,
}

impl Emitter {
    /// Queue a progress message. Returns `false` once the consumer is gone.
    pub fn progress(&self, message: impl Into<String>) -> bool {
        self.outbox.push(message.into())
    }

    /// Whether the consumer dropped the stream.
    pub fn is_cancelled(&self) -> bool {
        self.outbox.is_closed()
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Draining,
    Done,
    Failed,
}

struct Consumer<T> {
    rx: Receiver<T>,
    worker: Option<JoinHandle<()>>,
    config: BridgeConfig,
    state: State,
    last_emit: Instant,
    failure: Option<String>,
}

impl<T> Consumer<T> {
    fn transition(&mut self, next: State) {
        debug!("Bridge {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Wait up to the join timeout for the worker, then detach it.
    async fn join_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            tokio::time::sleep(JOIN_POLL).await;
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Bridge worker exited abnormally");
            }
        } else {
            warn!(
                "Bridge worker still running after {:?}, detaching",
                self.config.join_timeout
            );
        }
    }

    async fn finish(&mut self, result: Option<T>) -> StreamEvent<T> {
        self.join_worker().await;
        match result {
            Some(value) => {
                self.transition(State::Done);
                info!("Bridge stream completed");
                StreamEvent::Complete(value)
            }
            None => {
                self.transition(State::Failed);
                let message = self
                    .failure
                    .take()
                    .unwrap_or_else(|| "worker ended without a result".to_string());
                warn!("Bridge stream failed: {}", message);
                StreamEvent::Error(message)
            }
        }
    }

    async fn next_event(&mut self) -> Option<StreamEvent<T>> {
        loop {
            if matches!(self.state, State::Done | State::Failed) {
                return None;
            }

            match tokio::time::timeout(self.config.poll_interval, self.rx.recv()).await {
                Ok(Some(Message::Item(text))) => {
                    self.last_emit = Instant::now();
                    return Some(StreamEvent::Progress(text));
                }
                Ok(Some(Message::Error(message))) => {
                    self.failure = Some(message);
                    self.transition(State::Draining);
                }
                Ok(Some(Message::Done(result))) => {
                    if self.state == State::Running {
                        self.transition(State::Draining);
                    }
                    return Some(self.finish(result).await);
                }
                Ok(None) => {
                    if self.failure.is_none() {
                        self.failure = Some("worker disconnected".to_string());
                    }
                    return Some(self.finish(None).await);
                }
                Err(_) => {
                    if self.last_emit.elapsed() >= self.config.heartbeat_interval {
                        self.last_emit = Instant::now();
                        return Some(StreamEvent::Heartbeat);
                    }
                }
            }
        }
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        if matches!(self.state, State::Running | State::Draining) {
            debug!("Bridge stream dropped before completion, worker detached");
        }
    }
}

/// Runs blocking producers as event streams.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start `producer` on a dedicated worker thread and return its events.
    ///
    /// Errors returned by the producer and panics inside it end the stream
    /// with a single `Error` event; neither reaches the caller's runtime.
    pub fn run<T, F>(&self, producer: F) -> Result<EventStream<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Emitter) -> Result<T> + Send + 'static,
    {
        self.config.validate()?;

        let (tx, rx) = channel::<T>(self.config.queue);
        let tx = Arc::new(tx);
        let emitter = Emitter {
            outbox: tx.clone(),
        };

        debug!("Starting bridge worker ({:?} queue)", self.config.queue);
        let worker = std::thread::Builder::new()
            .name("kb-bridge".to_string())
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| producer(&emitter)));
                match outcome {
                    Ok(Ok(value)) => {
                        tx.send(Message::Done(Some(value)));
                    }
                    Ok(Err(e)) => {
                        tx.send(Message::Error(e.to_string()));
                        tx.send(Message::Done(None));
                    }
                    Err(payload) => {
                        let err = KbError::bridge_worker(format!(
                            "producer panicked: {}",
                            panic_message(payload.as_ref())
                        ));
                        tx.send(Message::Error(err.to_string()));
                        tx.send(Message::Done(None));
                    }
                }
                debug!("Bridge worker finished");
            })
            .map_err(|e| KbError::bridge_worker(format!("failed to spawn worker: {}", e)))?;

        let consumer = Consumer {
            rx,
            worker: Some(worker),
            config: self.config.clone(),
            state: State::Running,
            last_emit: Instant::now(),
            failure: None,
        };

        Ok(stream::unfold(consumer, |mut consumer| async move {
            let event = consumer.next_event().await?;
            debug!("Bridge emitting {} event", event.kind());
            Some((event, consumer))
        })
        .boxed())
    }
}
