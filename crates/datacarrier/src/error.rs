use std::error::Error as StdError;
use thiserror::Error;

/// Errors from building and driving carriers and workers.
///
/// The producer path never produces one of these: a refused write is a
/// `false` (or the item handed back), not an error.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// Channels need at least one lane.
    #[error("lane count must be at least 1")]
    ZeroLanes,
    /// Each lane needs at least one slot.
    #[error("lane capacity must be at least 1")]
    ZeroCapacity,
    /// The worker's scratch batch must be able to hold an item.
    #[error("batch capacity must be at least 1")]
    ZeroBatchCapacity,
    /// A pool needs at least one worker.
    #[error("consumer pool `{name}` has no workers")]
    EmptyPool {
        /// Pool name from its config.
        name: String,
    },
    /// `start` called twice, or after shutdown.
    #[error("consumer worker `{0}` was already started")]
    AlreadyStarted(String),
    /// Registration arrived after the final flush was published.
    #[error("consumer targets are closed; worker `{0}` is shutting down")]
    TargetsClosed(String),
    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn consumer worker `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The worker thread unwound instead of returning.
    #[error("consumer worker `{0}` panicked")]
    WorkerPanicked(String),
}

/// Failure reported by a [`Sink`](crate::Sink) while consuming a batch.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-layer failure (network, gRPC, HTTP)
    #[error("transport error: {0}")]
    Transport(String),
    /// The batch could not be encoded for the wire
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Any other error raised by the sink
    #[error("sink error: {0}")]
    Other(#[from] Box<dyn StdError + Send + Sync>),
    /// `consume` panicked; the payload message is captured
    #[error("sink panicked: {0}")]
    Panicked(String),
}

impl SinkError {
    /// Builds a `SinkError::Panicked` from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_messages() {
        let err = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert!(matches!(SinkError::from_panic(&*err), SinkError::Panicked(m) if m == "boom"));

        let err = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert!(matches!(SinkError::from_panic(&*err), SinkError::Panicked(m) if m == "code 7"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CarrierError::EmptyPool { name: "jvm".into() }.to_string(),
            "consumer pool `jvm` has no workers"
        );
        assert_eq!(SinkError::Transport("reset".into()).to_string(), "transport error: reset");
    }
}
