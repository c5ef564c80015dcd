//! Events delivered to stream consumers.

/// One event of a bridged stream.
///
/// A stream carries any number of `Progress` and `Heartbeat` events and
/// ends with exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    /// Progress text reported by the producer.
    Progress(String),

    /// Keep-alive emitted while the producer is quiet.
    Heartbeat,

    /// The producer's result.
    Complete(T),

    /// The producer failed or panicked.
    Error(String),
}

impl<T> StreamEvent<T> {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }

    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Heartbeat => "heartbeat",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }
}
