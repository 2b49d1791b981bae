//! # peer-gossip core
//!
//! Pure primitives for the push side of the delta gossip protocol: vector
//! clocks, deltas, snapshots, and identifiers.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`VectorClock`] - Per-actor counters; immutable snapshots
//! - [`CausalOrder`] - Result of comparing two clocks
//! - [`DeltaEntry`] - An opaque CRDT update with the clock it was made against
//! - [`StateSnapshot`] - Full state plus its clock
//! - [`NodeId`], [`ActorId`] - Peer and actor identifiers
//!
//! ## Canonicalization
//!
//! Wire values are deterministic CBOR. See the [`canonical`] module.

pub mod canonical;
pub mod clock;
pub mod delta;
pub mod error;
pub mod types;

pub use canonical::{decode_value, encode_canonical};
pub use clock::{CausalOrder, VectorClock};
pub use delta::{DeltaEntry, StateSnapshot};
pub use error::CoreError;
pub use types::{ActorId, NodeId};
