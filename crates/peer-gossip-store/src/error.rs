//! Error types for the store module.

use peer_gossip_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store has been shut down.
    #[error("store closed")]
    Closed,

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// State blob could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
