//! # peer-gossip testkit
//!
//! Testing utilities for peer-gossip.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known frame encodings for cross-implementation checks
//! - **Generators**: Proptest strategies for clocks and session states
//! - **Fixtures**: A call-recording store double and a remote peer emulator
//!
//! ## Golden Vectors
//!
//! ```rust
//! use peer_gossip_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, hex) in verify_all_vectors() {
//!     assert!(ok, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use peer_gossip_testkit::generators::vector_clock;
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_idempotent(a in vector_clock()) {
//!         prop_assert_eq!(a.merge(&a), a);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use peer_gossip_testkit::fixtures::{clock, RecordingStore};
//!
//! let store = RecordingStore::new();
//! store.inner().apply_local(&"A".into(), &b"x"[..]);
//! assert_eq!(store.inner().clock(), clock(&[("A", 1)]));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{clock, node_id, CallPhase, RecordingStore, RemotePeer, StoreCall};
pub use generators::{state_from_params, vector_clock, StateParams};
pub use vectors::{all_vectors, verify_all_vectors, FrameVector};
