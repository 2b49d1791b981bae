//! Error types for the sync module.

use peer_gossip_core::CoreError;
use peer_gossip_store::StoreError;
use thiserror::Error;

/// Errors that can occur in a push session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Inbound bytes could not be decoded into a frame.
    #[error("decode error: {0}")]
    Decode(String),

    /// An outbound frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A queued reconciliation task failed outside the store.
    #[error("queued task failed: {0}")]
    TaskFailed(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A queued task was dropped before it ran to completion.
    #[error("task cancelled")]
    Cancelled,

    /// The session already terminated.
    #[error("session ended")]
    SessionEnded,
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EncodingError(msg) => SyncError::Encode(msg),
            other => SyncError::Decode(other.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
