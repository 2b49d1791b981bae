//! # peer-gossip sync
//!
//! Push side of the delta anti-entropy gossip protocol.
//!
//! ## Overview
//!
//! One push session runs per remote peer. It keeps that peer up to date
//! with the local [`DeltaStore`](peer_gossip_store::DeltaStore) in one of
//! two modes:
//!
//! - **Eager**: stream every delta the peer is missing, and fall back to a
//!   full clock-and-state snapshot when deltas are not enough.
//! - **Lazy**: only announce the local clock; the peer pulls what it needs.
//!
//! The peer switches modes and shares its clock through Presentation
//! frames. Local clock changes and Presentations both trigger
//! reconciliation attempts, which a [`SerialTaskQueue`] runs one at a time.
//!
//! ## Key Properties
//!
//! - **Single-flight**: reconciliation attempts of one session never overlap
//! - **Monotonic**: the pushed clock only ever grows
//! - **Cancellable**: switching to lazy stops an in-progress delta push
//! - **Clean shutdown**: a session ends once, detaching from the store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peer_gossip_core::NodeId;
//! use peer_gossip_store::MemoryStore;
//! use peer_gossip_sync::{memory::MemoryDuplex, run_duplex, spawn_session, PushConfig};
//!
//! async fn example() -> peer_gossip_sync::Result<()> {
//!     let (local, peer) = (NodeId::random(), NodeId::random());
//!     let store = Arc::new(MemoryStore::new());
//!     let (ours, _theirs) = MemoryDuplex::pair(local, peer);
//!
//!     let handle = spawn_session(local, peer, store, PushConfig::default());
//!     run_duplex(handle, &ours).await
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Pusher                                Remote
//!   |<------- Presentation(clock) -------|
//!   |-------- Deltas ------------------->|
//!   |-------- Deltas ------------------->|
//!   |-------- Snapshot (if needed) ----->|
//!   |<------- Presentation(lazy) --------|
//!   |-------- ClockOnly ---------------->|
//!   |<------- Presentation(eager) -------|
//!   |-------- Deltas ------------------->|
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod transport;

pub use error::{Result, SyncError};
pub use messages::{limits, FrameKind, OutboundFrame, Presentation};
pub use protocol::{PushConfig, PushMode, PushSession, RetryPolicy, SessionOutput, SessionState};
pub use queue::{SerialTaskQueue, TaskHandle};
pub use session::{spawn_session, SessionHandle, SessionSink, SessionSource};
pub use transport::{memory, run_duplex, Transport};
