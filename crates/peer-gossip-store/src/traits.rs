//! DeltaStore trait: the boundary between the push protocol and the CRDT
//! store it replicates.
//!
//! The store owns persistence, delta generation and state merging. Push
//! sessions only read from it and listen for clock changes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use peer_gossip_core::{DeltaEntry, StateSnapshot, VectorClock};

use crate::error::Result;

/// Lazy sequence of outstanding deltas, in causal emission order.
pub type DeltaStream = BoxStream<'static, Result<DeltaEntry>>;

/// Sending half the store uses to notify one listener of clock changes.
pub type ClockListener = mpsc::UnboundedSender<VectorClock>;

/// Handle returned when registering a clock listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The DeltaStore trait: async interface consumed by push sessions.
///
/// A single store is shared read-only by every session; the store
/// serializes its own mutations.
///
/// # Design Notes
///
/// - **Restartable streams**: every [`DeltaStore::delta_stream`] call starts a
///   fresh sequence. Dropping the stream releases whatever backs it.
/// - **Causal emission**: no delta is emitted before its prerequisites
///   relative to the requested starting clock.
/// - **Listeners**: each session registers at most one listener and removes
///   it when the session ends.
#[async_trait]
pub trait DeltaStore: Send + Sync {
    /// Deltas the holder of `from` is missing. `None` means the peer's
    /// clock is unknown and every retained delta is eligible.
    ///
    /// The sequence terminates when caught up, or with an error item.
    fn delta_stream(&self, from: Option<&VectorClock>) -> DeltaStream;

    /// Current clock together with the full state it describes.
    async fn clock_and_state(&self) -> Result<StateSnapshot>;

    /// Current clock.
    async fn latest_clock(&self) -> Result<VectorClock>;

    /// Register a listener notified with the new clock on every local
    /// clock advance.
    fn add_clock_listener(&self, listener: ClockListener) -> ListenerId;

    /// Detach a listener. Returns false if it was not registered.
    fn remove_clock_listener(&self, id: ListenerId) -> bool;
}
