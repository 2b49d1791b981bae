//! The push protocol entry point.
//!
//! A [`PushProtocol`] owns the local identity, the shared store and the
//! session configuration, and opens one push session per remote peer.

use std::sync::Arc;

use peer_gossip_core::NodeId;
use peer_gossip_store::DeltaStore;
use peer_gossip_sync::{run_duplex, spawn_session, PushConfig, SessionHandle, Transport};

use crate::error::Result;

/// Opens push sessions from one local replica to its peers.
pub struct PushProtocol<S: DeltaStore + ?Sized> {
    /// Identity of this replica, used for log correlation.
    local_id: NodeId,
    /// The replicated store, shared by every session.
    store: Arc<S>,
    config: PushConfig,
}

impl<S: DeltaStore + ?Sized + 'static> PushProtocol<S> {
    /// Create a protocol instance for one local replica.
    pub fn new(local_id: NodeId, store: Arc<S>, config: PushConfig) -> Self {
        Self {
            local_id,
            store,
            config,
        }
    }

    /// Identity of the local replica.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Configuration applied to every session.
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Start a push session towards `peer`.
    ///
    /// The caller feeds Presentations into the returned sink and forwards
    /// frames from the returned source. Must be called inside a tokio
    /// runtime.
    pub fn for_peer(&self, peer: NodeId) -> SessionHandle {
        tracing::info!(local = %self.local_id, peer = %peer, "opening push session");
        spawn_session(
            self.local_id,
            peer,
            Arc::clone(&self.store),
            self.config.clone(),
        )
    }

    /// Run a push session over `transport` until either side ends it.
    pub async fn serve<T>(&self, transport: &T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        let peer = transport.peer_id();
        let handle = self.for_peer(peer);
        match run_duplex(handle, transport).await {
            Ok(()) => {
                tracing::info!(peer = %peer, "push session closed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "push session aborted");
                Err(e.into())
            }
        }
    }
}
