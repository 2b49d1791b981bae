//! Transport abstraction for push sessions.
//!
//! A transport is a bidirectional byte pipe to one remote peer. Framing is
//! the transport's job: every `send` is one encoded frame and every `recv`
//! yields one. Implementations may use WebSockets, WebRTC data channels or
//! anything else that preserves message boundaries.

use async_trait::async_trait;
use futures::StreamExt;

use peer_gossip_core::NodeId;

use crate::codec;
use crate::error::{Result, SyncError};
use crate::session::SessionHandle;

/// Byte pipe to a single remote peer.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded frame.
    async fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Receive the next encoded frame.
    ///
    /// Returns `None` once the remote closed its side.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Close our side, optionally telling the remote why.
    async fn close(&self, error: Option<&SyncError>) -> Result<()>;

    /// Identity of the remote peer.
    fn peer_id(&self) -> NodeId;
}

/// Pump a session over a transport until the session ends.
///
/// Inbound frames are decoded as Presentations and handed to the session;
/// outbound frames are encoded and sent. The transport is closed at the end,
/// with the session's error if it failed.
pub async fn run_duplex<T>(handle: SessionHandle, transport: &T) -> Result<()>
where
    T: Transport + ?Sized,
{
    let SessionHandle { sink, mut source } = handle;

    let inbound = async move {
        loop {
            match transport.recv().await {
                Ok(Some(bytes)) => {
                    if sink.send_bytes(&bytes).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("transport closed by remote");
                    break;
                }
                Err(e) => {
                    let _ = sink.fail(e).await;
                    break;
                }
            }
        }
        // Dropping the sink here ends the session's inbound side.
    };

    let outbound = async {
        while let Some(item) = source.next().await {
            let frame = item?;
            transport.send(codec::encode_frame(&frame)?).await?;
        }
        Ok::<(), SyncError>(())
    };

    tokio::pin!(inbound, outbound);
    let mut inbound_done = false;
    let result = loop {
        tokio::select! {
            _ = &mut inbound, if !inbound_done => inbound_done = true,
            result = &mut outbound => break result,
        }
    };

    let closed = transport.close(result.as_ref().err()).await;
    result.and(closed)
}

/// In-memory transports for tests and simulations.
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    const DEFAULT_CAPACITY: usize = 256;

    /// One end of an in-memory duplex pipe.
    pub struct MemoryDuplex {
        local: NodeId,
        peer: NodeId,
        tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
        rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
        close_reason: Mutex<Option<String>>,
    }

    impl MemoryDuplex {
        /// Connect `a` and `b`. The first end belongs to `a`.
        pub fn pair(a: NodeId, b: NodeId) -> (MemoryDuplex, MemoryDuplex) {
            Self::pair_with_capacity(a, b, DEFAULT_CAPACITY)
        }

        /// Like [`MemoryDuplex::pair`] with a custom per-direction buffer.
        pub fn pair_with_capacity(
            a: NodeId,
            b: NodeId,
            capacity: usize,
        ) -> (MemoryDuplex, MemoryDuplex) {
            let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
            let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
            (Self::end(a, b, a_tx, a_rx), Self::end(b, a, b_tx, b_rx))
        }

        fn end(
            local: NodeId,
            peer: NodeId,
            tx: mpsc::Sender<Vec<u8>>,
            rx: mpsc::Receiver<Vec<u8>>,
        ) -> Self {
            Self {
                local,
                peer,
                tx: Mutex::new(Some(tx)),
                rx: tokio::sync::Mutex::new(rx),
                close_reason: Mutex::new(None),
            }
        }

        /// Identity of this end.
        pub fn local_id(&self) -> NodeId {
            self.local
        }

        /// Whether our sending side has been closed.
        pub fn is_closed(&self) -> bool {
            self.tx.lock().is_none()
        }

        /// Error message passed to [`Transport::close`], if any.
        pub fn close_reason(&self) -> Option<String> {
            self.close_reason.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryDuplex {
        async fn send(&self, frame: Vec<u8>) -> Result<()> {
            let tx = self.tx.lock().clone();
            let tx = tx.ok_or_else(|| SyncError::TransportError("transport closed".into()))?;
            tx.send(frame)
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>> {
            let mut rx = self.rx.lock().await;
            Ok(rx.recv().await)
        }

        async fn close(&self, error: Option<&SyncError>) -> Result<()> {
            if let Some(error) = error {
                *self.close_reason.lock() = Some(error.to_string());
            }
            self.tx.lock().take();
            Ok(())
        }

        fn peer_id(&self) -> NodeId {
            self.peer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDuplex;
    use super::*;
    use crate::messages::{OutboundFrame, Presentation};
    use crate::protocol::PushConfig;
    use crate::session::spawn_session;
    use peer_gossip_core::{ActorId, VectorClock};
    use peer_gossip_store::MemoryStore;
    use std::sync::Arc;

    fn ids() -> (NodeId, NodeId) {
        (NodeId::from_bytes([1; 32]), NodeId::from_bytes([2; 32]))
    }

    #[tokio::test]
    async fn test_memory_duplex_roundtrip() {
        let (a, b) = ids();
        let (left, right) = MemoryDuplex::pair(a, b);
        assert_eq!(left.peer_id(), b);
        assert_eq!(right.peer_id(), a);

        left.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(right.recv().await.unwrap(), Some(vec![1, 2, 3]));

        left.close(None).await.unwrap();
        assert!(left.is_closed());
        assert_eq!(right.recv().await.unwrap(), None);
        assert!(left.send(vec![4]).await.is_err());
    }

    #[tokio::test]
    async fn test_run_duplex_pushes_frames_and_closes() {
        let (a, b) = ids();
        let store = Arc::new(MemoryStore::new());
        store.apply_local(&ActorId::from("A"), &b"x"[..]);

        let (local_end, remote_end) = MemoryDuplex::pair(a, b);
        let handle = spawn_session(a, b, Arc::clone(&store), PushConfig::default());
        let pump = tokio::spawn(async move { run_duplex(handle, &local_end).await });

        let hello = codec::encode_presentation(&Presentation::eager(Some(VectorClock::new())))
            .unwrap();
        remote_end.send(hello).await.unwrap();

        let bytes = remote_end.recv().await.unwrap().unwrap();
        let frame = codec::decode_frame(&bytes).unwrap();
        assert!(matches!(frame, OutboundFrame::Deltas(_)));
        assert_eq!(frame.clock(), Some(store.clock()));

        remote_end.close(None).await.unwrap();
        pump.await.unwrap().unwrap();
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_run_duplex_reports_decode_error() {
        let (a, b) = ids();
        let store = Arc::new(MemoryStore::new());
        let (local_end, remote_end) = MemoryDuplex::pair(a, b);
        let handle = spawn_session(a, b, Arc::clone(&store), PushConfig::default());

        remote_end.send(vec![0xff]).await.unwrap();
        let err = run_duplex(handle, &local_end).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
        assert!(local_end.close_reason().is_some());
        assert_eq!(remote_end.recv().await.unwrap(), None);
    }
}
