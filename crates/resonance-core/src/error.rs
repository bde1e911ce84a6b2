//! Error types for memory stores.

use thiserror::Error;

/// Result type for [`MemoryStore`](crate::MemoryStore) operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors a memory store can report.
///
/// None of these are fatal to a session: the controller turns each one
/// into a connection-state transition plus a local fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable, timed out, or failed internally
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Credential refused by the backend
    #[error("store rejected the credential")]
    Unauthorized,

    /// Backend is throttling writes
    #[error("store is rate limiting requests")]
    RateLimited,

    /// Payload refused as malformed
    #[error("entry rejected: {0}")]
    Rejected(String),
}
