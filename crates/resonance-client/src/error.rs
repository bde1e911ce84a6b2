//! Error types for the networked client.

use reqwest::StatusCode;
use resonance_core::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with a non-success status
    #[error("Store returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// WebSocket failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

fn classify(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Rejected(message),
        other => StoreError::Unavailable(format!("store returned {}", other)),
    }
}

impl From<Error> for StoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Status { status, message } => classify(status, message),
            Error::Http(e) => match e.status() {
                Some(status) => classify(status, e.to_string()),
                None => StoreError::Unavailable(e.to_string()),
            },
            Error::Serialization(e) => StoreError::Unavailable(format!("bad response: {}", e)),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}
