//! Vector clocks: the logical time every replication decision is based on.
//!
//! A [`VectorClock`] maps each actor to the number of updates observed from
//! it. Clocks are immutable snapshots. Every operation returns a new clock
//! and never mutates a shared one in place.
//!
//! Missing actors count as zero, so `{A: 1}` and `{A: 1, B: 0}` are the same
//! clock. Zero counters are dropped on construction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ActorId;

/// Causal relationship of one clock to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Every counter of the first clock is <= the second, at least one is <.
    Before,
    /// Every counter of the first clock is >= the second, at least one is >.
    After,
    /// All counters are equal.
    Equal,
    /// Neither clock dominates the other.
    Concurrent,
}

impl CausalOrder {
    /// One-sided dominance test: `After` or `Equal`.
    ///
    /// Concurrent clocks are not ordered, so this is not the negation of
    /// [`CausalOrder::Before`].
    pub fn dominates_or_equals(self) -> bool {
        matches!(self, CausalOrder::After | CausalOrder::Equal)
    }

    /// Flip the point of view.
    pub fn reverse(self) -> Self {
        match self {
            CausalOrder::Before => CausalOrder::After,
            CausalOrder::After => CausalOrder::Before,
            other => other,
        }
    }
}

/// A vector clock.
///
/// Deserialization goes through [`VectorClock::from_entries`], so zero
/// counters never survive a decode.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ActorId, u64>", into = "BTreeMap<ActorId, u64>")]
pub struct VectorClock(BTreeMap<ActorId, u64>);

impl VectorClock {
    /// The empty clock.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a clock from `(actor, counter)` pairs. Zero counters are dropped;
    /// repeated actors keep the highest counter.
    pub fn from_entries<A, I>(entries: I) -> Self
    where
        A: Into<ActorId>,
        I: IntoIterator<Item = (A, u64)>,
    {
        let mut map = BTreeMap::new();
        for (actor, counter) in entries {
            if counter == 0 {
                continue;
            }
            let slot = map.entry(actor.into()).or_insert(0);
            *slot = (*slot).max(counter);
        }
        Self(map)
    }

    /// Counter for an actor (0 if absent).
    pub fn get(&self, actor: &ActorId) -> u64 {
        self.0.get(actor).copied().unwrap_or(0)
    }

    /// Number of actors with a non-zero counter.
    pub fn len(&self) -> usize {
        self.0.values().filter(|c| **c > 0).count()
    }

    /// True if no actor has a non-zero counter.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(actor, counter)` in ascending actor order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, u64)> {
        self.0.iter().filter(|(_, c)| **c > 0).map(|(a, c)| (a, *c))
    }

    /// Pointwise maximum of two clocks.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.0.clone();
        for (actor, &counter) in &other.0 {
            let slot = merged.entry(actor.clone()).or_insert(0);
            *slot = (*slot).max(counter);
        }
        merged.retain(|_, c| *c > 0);
        VectorClock(merged)
    }

    /// A copy of this clock with `actor` advanced by one.
    ///
    /// Saturates at `u64::MAX`. Use [`VectorClock::checked_increment`] for
    /// clocks that came from a peer.
    pub fn increment(&self, actor: &ActorId) -> VectorClock {
        let mut next = self.0.clone();
        let slot = next.entry(actor.clone()).or_insert(0);
        *slot = slot.saturating_add(1);
        VectorClock(next)
    }

    /// Like [`VectorClock::increment`], but `None` if the counter is already
    /// at `u64::MAX`.
    pub fn checked_increment(&self, actor: &ActorId) -> Option<VectorClock> {
        let counter = self.get(actor).checked_add(1)?;
        let mut next = self.0.clone();
        next.insert(actor.clone(), counter);
        Some(VectorClock(next))
    }

    /// Compare under the per-actor pointwise ordering.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut greater = false;
        let mut less = false;

        for actor in self.0.keys().chain(other.0.keys()) {
            let ours = self.get(actor);
            let theirs = other.get(actor);
            if ours > theirs {
                greater = true;
            } else if ours < theirs {
                less = true;
            }
            if greater && less {
                return CausalOrder::Concurrent;
            }
        }

        match (greater, less) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// `self` causally dominates or equals `other`.
    pub fn dominates_or_equals(&self, other: &VectorClock) -> bool {
        self.compare(other).dominates_or_equals()
    }

    /// Every actor has the same counter in both clocks.
    pub fn is_identical(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.is_identical(other)
    }
}

impl Eq for VectorClock {}

impl From<BTreeMap<ActorId, u64>> for VectorClock {
    fn from(entries: BTreeMap<ActorId, u64>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<VectorClock> for BTreeMap<ActorId, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.0
    }
}

impl<A: Into<ActorId>> FromIterator<(A, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (A, u64)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(a, c)| (a.as_str(), c)))
            .finish()
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
