//! In-memory implementation of the DeltaStore trait.
//!
//! Replicates a grow-only set of opaque payloads: the smallest CRDT that
//! still has real merge semantics, which is enough to check convergence in
//! tests and simulations. Nothing is persisted.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use ciborium::value::Value;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use peer_gossip_core::{
    decode_value, encode_canonical, ActorId, DeltaEntry, StateSnapshot, VectorClock,
};

use crate::error::{Result, StoreError};
use crate::traits::{ClockListener, DeltaStore, DeltaStream, ListenerId};

/// In-memory store implementation.
///
/// Thread-safe via RwLock. All data is lost when the store is dropped.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Clock covering everything in `items`.
    clock: VectorClock,

    /// Retained deltas in the order they were applied.
    log: Vec<DeltaEntry>,

    /// Current state: the payload set.
    items: BTreeSet<Bytes>,

    /// Registered clock listeners.
    listeners: HashMap<ListenerId, ClockListener>,

    next_listener: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                clock: VectorClock::new(),
                log: Vec::new(),
                items: BTreeSet::new(),
                listeners: HashMap::new(),
                next_listener: 0,
            }),
        }
    }

    /// Create a store holding a snapshot and no retained deltas.
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Result<Self> {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            inner.items = decode_items(&snapshot.state)?;
            inner.clock = snapshot.clock.clone();
        }
        Ok(store)
    }

    /// Record a locally authored update and return the new clock.
    pub fn apply_local(&self, author: &ActorId, payload: impl Into<Bytes>) -> VectorClock {
        let mut inner = self.inner.write();
        let entry = DeltaEntry::new(inner.clock.clone(), author.clone(), payload);
        inner.clock = entry.resulting_clock();
        inner.items.insert(entry.payload.clone());
        inner.log.push(entry);

        let clock = inner.clock.clone();
        inner.notify(&clock);
        clock
    }

    /// Merge a delta received from elsewhere.
    ///
    /// Returns false if the delta was already covered by the local clock.
    /// A delta whose author counter cannot advance is rejected as
    /// [`StoreError::InvalidData`].
    pub fn apply_delta(&self, entry: DeltaEntry) -> Result<bool> {
        let resulting = entry
            .checked_resulting_clock()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let mut inner = self.inner.write();
        if inner.clock.dominates_or_equals(&resulting) {
            return Ok(false);
        }

        inner.clock = inner.clock.merge(&resulting);
        inner.items.insert(entry.payload.clone());
        inner.log.push(entry);

        let clock = inner.clock.clone();
        inner.notify(&clock);
        Ok(true)
    }

    /// Merge a full snapshot. Returns false if it brought nothing new.
    pub fn apply_snapshot(&self, snapshot: &StateSnapshot) -> Result<bool> {
        let incoming = decode_items(&snapshot.state)?;

        let mut inner = self.inner.write();
        if inner.clock.dominates_or_equals(&snapshot.clock) {
            return Ok(false);
        }

        inner.items.extend(incoming);
        inner.clock = inner.clock.merge(&snapshot.clock);

        let clock = inner.clock.clone();
        inner.notify(&clock);
        Ok(true)
    }

    /// Drop every retained delta. Peers that are behind can then only be
    /// brought up to date with a snapshot.
    pub fn compact(&self) -> usize {
        let mut inner = self.inner.write();
        let dropped = inner.log.len();
        inner.log.clear();
        tracing::debug!(dropped, "compacted delta log");
        dropped
    }

    /// Current clock.
    pub fn clock(&self) -> VectorClock {
        self.inner.read().clock.clone()
    }

    /// Current payload set, in ascending byte order.
    pub fn items(&self) -> Vec<Bytes> {
        self.inner.read().items.iter().cloned().collect()
    }

    /// Number of retained deltas.
    pub fn log_len(&self) -> usize {
        self.inner.read().log.len()
    }

    /// Number of registered clock listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.read().listeners.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    /// Push the new clock to every listener, pruning closed ones.
    fn notify(&mut self, clock: &VectorClock) {
        self.listeners.retain(|id, listener| {
            let open = listener.send(clock.clone()).is_ok();
            if !open {
                tracing::debug!(listener = id.0, "pruning closed clock listener");
            }
            open
        });
    }
}

#[async_trait]
impl DeltaStore for MemoryStore {
    fn delta_stream(&self, from: Option<&VectorClock>) -> DeltaStream {
        let mut known = from.cloned().unwrap_or_default();
        let mut pending = Vec::new();
        {
            let inner = self.inner.read();
            for entry in &inner.log {
                let resulting = entry.resulting_clock();
                if known.dominates_or_equals(&resulting) {
                    continue;
                }
                // A compacted prefix leaves a gap; only a snapshot can cross it.
                if !known.dominates_or_equals(&entry.previous_clock) {
                    break;
                }
                known = known.merge(&resulting);
                pending.push(entry.clone());
            }
        }

        tracing::trace!(count = pending.len(), "opening delta stream");
        stream::iter(pending.into_iter().map(Ok)).boxed()
    }

    async fn clock_and_state(&self) -> Result<StateSnapshot> {
        let (clock, items) = {
            let inner = self.inner.read();
            (inner.clock.clone(), inner.items.clone())
        };
        Ok(StateSnapshot::new(clock, encode_items(&items)?))
    }

    async fn latest_clock(&self) -> Result<VectorClock> {
        Ok(self.inner.read().clock.clone())
    }

    fn add_clock_listener(&self, listener: ClockListener) -> ListenerId {
        let mut inner = self.inner.write();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.insert(id, listener);
        id
    }

    fn remove_clock_listener(&self, id: ListenerId) -> bool {
        self.inner.write().listeners.remove(&id).is_some()
    }
}

/// State blob: CBOR array of byte strings.
fn encode_items(items: &BTreeSet<Bytes>) -> Result<Bytes> {
    let value = Value::Array(items.iter().map(|b| Value::Bytes(b.to_vec())).collect());
    Ok(Bytes::from(encode_canonical(&value)?))
}

fn decode_items(state: &[u8]) -> Result<BTreeSet<Bytes>> {
    if state.is_empty() {
        return Ok(BTreeSet::new());
    }
    let value = decode_value(state)?;
    let array = value
        .as_array()
        .ok_or_else(|| StoreError::InvalidData("state must be an array".into()))?;

    array
        .iter()
        .map(|item| {
            item.as_bytes()
                .map(|b| Bytes::from(b.clone()))
                .ok_or_else(|| StoreError::InvalidData("state item must be bytes".into()))
        })
        .collect()
}
