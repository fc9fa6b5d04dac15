//! Consumption engine error types.

use thiserror::Error;

/// Errors raised while taking in a pushed payload.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// Payload is not a valid message
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias using ConsumeError.
pub type ConsumeResult<T> = Result<T, ConsumeError>;

/// Errors raised while acknowledging a processed message.
#[derive(Error, Debug)]
pub enum AckError {
    /// Report body could not be encoded
    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    /// Request never reached the broker
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias using AckError.
pub type AckResult<T> = Result<T, AckError>;
