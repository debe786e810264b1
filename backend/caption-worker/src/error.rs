//! Error types for the caption worker

use std::time::Duration;
use thiserror::Error;

/// Result type for caption worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Caption worker errors
///
/// Only `Config` and `Redis` are fatal, and only at startup. Every other
/// variant is absorbed by the dispatcher: logged, counted and optionally
/// routed to the dead-letter channel.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Missing or malformed process configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound payload is not a valid photo metadata record
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Photo URL cannot be fetched (unparseable or no host)
    #[error("Invalid photo url: {0}")]
    InvalidPhotoUrl(String),

    /// Image download failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Captioning API rejected the image or could not be reached
    #[error("Caption API error: {0}")]
    Api(String),

    /// Fetch or API call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Keyed store read or write failed
    #[error("Persist error: {0}")]
    Persist(String),

    /// Outbound publish failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// Redis connection or subscription error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl WorkerError {
    /// Whether the image could not be retrieved
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidPhotoUrl(_)
                | WorkerError::Fetch(_)
                | WorkerError::Timeout {
                    operation: "image fetch",
                    ..
                }
        )
    }
}
