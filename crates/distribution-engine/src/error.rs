//! Distribution engine error types.

use thiserror::Error;

/// Distribution engine error type.
#[derive(Error, Debug)]
pub enum DistributionError {
    /// Message rejected because its id is empty
    #[error("Message id must not be empty")]
    EmptyMessageId,

    /// Inbound queue is at capacity
    #[error("Queue full, dropped message {0}")]
    QueueFull(String),

    /// Inbound queue has no consumer anymore
    #[error("Queue closed")]
    QueueClosed,

    /// `run` was called twice
    #[error("Distribution loop already running")]
    AlreadyRunning,

    /// Fallback persistence failed
    #[error("Fallback store error: {0}")]
    Store(#[from] fallback_store::StoreError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using DistributionError.
pub type DistributionResult<T> = Result<T, DistributionError>;
