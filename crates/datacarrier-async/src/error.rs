//! Error types for the async worker.

use datacarrier::CarrierError;
use thiserror::Error;
use tokio::runtime::TryCurrentError;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum AsyncWorkerError {
    /// Registration or configuration rejected by the core carrier.
    #[error(transparent)]
    Carrier(#[from] CarrierError),

    /// `start` was called outside a Tokio runtime.
    #[error("consumer worker '{name}' needs a tokio runtime to start")]
    NoRuntime {
        name: String,
        #[source]
        source: TryCurrentError,
    },

    /// The consume task panicked or was cancelled.
    #[error("consumer task '{name}' failed")]
    TaskFailed {
        name: String,
        #[source]
        source: JoinError,
    },
}

impl AsyncWorkerError {
    /// Returns `true` if the worker can no longer make progress.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskFailed { .. })
    }
}
