//! Error types for the push protocol facade.

use peer_gossip_core::CoreError;
use peer_gossip_store::StoreError;
use peer_gossip_sync::SyncError;
use thiserror::Error;

/// Errors surfaced by [`PushProtocol`](crate::PushProtocol).
#[derive(Debug, Error)]
pub enum GossipError {
    /// Session or transport failure.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Encoding error outside a session.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl GossipError {
    /// Whether the session ended because the remote sent something invalid.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            GossipError::Sync(SyncError::Decode(_) | SyncError::InvalidMessage(_))
        )
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, GossipError>;
