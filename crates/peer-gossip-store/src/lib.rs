//! # peer-gossip store
//!
//! The boundary between push sessions and the CRDT delta store they
//! replicate, plus an in-memory implementation.
//!
//! ## Overview
//!
//! Push sessions see the store only through the [`DeltaStore`] trait: a lazy
//! stream of outstanding deltas, the current clock and state, and clock-change
//! notifications. Persistence, compaction and merging stay behind the trait.
//!
//! ## Key Types
//!
//! - [`DeltaStore`] - The async trait consumed by push sessions
//! - [`MemoryStore`] - In-memory grow-only-set store for tests and simulations
//! - [`DeltaStream`] - Boxed stream of deltas
//! - [`ListenerId`] - Handle for a registered clock listener
//!
//! ## Usage
//!
//! ```rust
//! use peer_gossip_core::ActorId;
//! use peer_gossip_store::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let clock = store.apply_local(&ActorId::from("alice"), &b"hello"[..]);
//! assert_eq!(clock.len(), 1);
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{ClockListener, DeltaStore, DeltaStream, ListenerId};
