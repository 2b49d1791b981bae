//! # peer-gossip
//!
//! Push side of a delta anti-entropy gossip protocol for CRDT replicas.
//!
//! ## Overview
//!
//! Replicas keep each other up to date by pushing what the other side is
//! missing. For every connected peer a push session:
//!
//! - **Pushes deltas** while the peer wants eager delivery
//! - **Falls back to snapshots** when deltas cannot bring the peer up to date
//! - **Announces clocks only** while the peer wants lazy delivery
//!
//! The peer steers the session with Presentation frames carrying its clock
//! and the mode it wants. Reconciliation is triggered by local clock changes
//! and by Presentations, and runs single-flight per session.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peer_gossip::{PushConfig, PushProtocol};
//! use peer_gossip::core::{ActorId, NodeId};
//! use peer_gossip::store::MemoryStore;
//! use peer_gossip::sync::memory::MemoryDuplex;
//!
//! async fn example() -> peer_gossip::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.apply_local(&ActorId::from("alice"), &b"hello"[..]);
//!
//!     let local = NodeId::random();
//!     let protocol = PushProtocol::new(local, store, PushConfig::default());
//!
//!     // Any Transport works; this one is in-memory.
//!     let (ours, _theirs) = MemoryDuplex::pair(local, NodeId::random());
//!     protocol.serve(&ours).await
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `peer_gossip::core` - Vector clocks, deltas, identifiers, CBOR helpers
//! - `peer_gossip::store` - The DeltaStore boundary and an in-memory store
//! - `peer_gossip::sync` - Push sessions, codec and transports

pub mod error;
pub mod push;

// Re-export component crates
pub use peer_gossip_core as core;
pub use peer_gossip_store as store;
pub use peer_gossip_sync as sync;

pub use error::{GossipError, Result};
pub use push::PushProtocol;

// Re-export commonly used types
pub use peer_gossip_core::{ActorId, CausalOrder, DeltaEntry, NodeId, StateSnapshot, VectorClock};
pub use peer_gossip_store::{DeltaStore, MemoryStore};
pub use peer_gossip_sync::{
    OutboundFrame, Presentation, PushConfig, PushMode, RetryPolicy, SessionHandle, Transport,
};
