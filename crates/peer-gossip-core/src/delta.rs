//! Deltas and state snapshots as the replication layer sees them.
//!
//! Payloads are opaque: the CRDT store produces and merges them, the push
//! protocol only moves them around.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::error::CoreError;
use crate::types::ActorId;

/// One CRDT update tagged with the clock it was produced against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    /// Clock of the authoring replica immediately before the update.
    pub previous_clock: VectorClock,
    /// Actor that produced the update.
    pub author: ActorId,
    /// Opaque encoded delta.
    pub payload: Bytes,
}

impl DeltaEntry {
    /// Create a delta entry.
    pub fn new(
        previous_clock: VectorClock,
        author: impl Into<ActorId>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            previous_clock,
            author: author.into(),
            payload: payload.into(),
        }
    }

    /// The clock a replica reaches after applying this delta on top of
    /// `previous_clock`.
    pub fn resulting_clock(&self) -> VectorClock {
        self.previous_clock.increment(&self.author)
    }

    /// [`DeltaEntry::resulting_clock`] for deltas received from a peer.
    ///
    /// Fails if the author's counter in `previous_clock` is already at
    /// `u64::MAX`.
    pub fn checked_resulting_clock(&self) -> Result<VectorClock, CoreError> {
        self.previous_clock
            .checked_increment(&self.author)
            .ok_or_else(|| CoreError::CounterOverflow(self.author.to_string()))
    }
}

/// Full replica state together with the clock it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub clock: VectorClock,
    pub state: Bytes,
}

impl StateSnapshot {
    /// Create a snapshot.
    pub fn new(clock: VectorClock, state: impl Into<Bytes>) -> Self {
        Self {
            clock,
            state: state.into(),
        }
    }
}
