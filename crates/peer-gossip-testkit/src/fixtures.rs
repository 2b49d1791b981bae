//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: clock builders, a store double
//! that records how it is called, and an emulated remote peer.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;

use peer_gossip_core::{NodeId, StateSnapshot, VectorClock};
use peer_gossip_store::{
    ClockListener, DeltaStore, DeltaStream, ListenerId, MemoryStore, StoreError,
};
use peer_gossip_sync::{codec, OutboundFrame, Presentation, PushMode, SyncError, Transport};

/// Build a clock from `(actor, counter)` pairs.
pub fn clock(entries: &[(&str, u64)]) -> VectorClock {
    VectorClock::from_entries(entries.iter().map(|(actor, n)| (*actor, *n)))
}

/// Deterministic node ID whose bytes are all `n`.
pub fn node_id(n: u8) -> NodeId {
    NodeId::from_bytes([n; 32])
}

/// Store operation observed by a [`RecordingStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    DeltaStream,
    ClockAndState,
    LatestClock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Begin,
    End,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(StoreCall, CallPhase)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    listeners_added: AtomicUsize,
    listeners_removed: AtomicUsize,
    unavailable_left: AtomicUsize,
}

impl Recorder {
    fn begin(self: &Arc<Self>, call: StoreCall) -> CallGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.events.lock().push((call, CallPhase::Begin));
        CallGuard {
            recorder: Arc::clone(self),
            call,
        }
    }

    fn take_failure(&self) -> bool {
        self.unavailable_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Marks a store call as finished when dropped.
struct CallGuard {
    recorder: Arc<Recorder>,
    call: StoreCall,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.recorder.events.lock().push((self.call, CallPhase::End));
        self.recorder.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Delta stream that keeps its call open until dropped.
struct GuardedStream {
    inner: DeltaStream,
    _guard: CallGuard,
}

impl Stream for GuardedStream {
    type Item = peer_gossip_store::Result<peer_gossip_core::DeltaEntry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// A [`MemoryStore`] wrapper that records every call.
///
/// Each call is slowed down by a configurable delay, so overlapping calls
/// from concurrent reconciliations would show up in
/// [`RecordingStore::max_concurrent_calls`]. A delta stream counts as one
/// call from creation until it is dropped.
pub struct RecordingStore {
    inner: MemoryStore,
    recorder: Arc<Recorder>,
    delay: Duration,
}

impl RecordingStore {
    /// Recording store without artificial delay.
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Sleep for `delay` inside every call and before every streamed delta.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            recorder: Arc::new(Recorder::default()),
            delay,
        }
    }

    /// The wrapped store, for applying updates.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail the next `count` single-shot calls with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.recorder
            .unavailable_left
            .store(count, Ordering::SeqCst);
    }

    /// Every call begin and end, in order.
    pub fn events(&self) -> Vec<(StoreCall, CallPhase)> {
        self.recorder.events.lock().clone()
    }

    /// Number of calls of one kind that have started.
    pub fn calls(&self, call: StoreCall) -> usize {
        self.events()
            .iter()
            .filter(|(c, phase)| *c == call && *phase == CallPhase::Begin)
            .count()
    }

    /// Most calls that were ever in progress at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.recorder.max_active.load(Ordering::SeqCst)
    }

    /// Number of clock listeners registered so far.
    pub fn listeners_added(&self) -> usize {
        self.recorder.listeners_added.load(Ordering::SeqCst)
    }

    /// Number of clock listener removals so far.
    pub fn listeners_removed(&self) -> usize {
        self.recorder.listeners_removed.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeltaStore for RecordingStore {
    fn delta_stream(&self, from: Option<&VectorClock>) -> DeltaStream {
        let guard = self.recorder.begin(StoreCall::DeltaStream);
        let delay = self.delay;
        let inner = self
            .inner
            .delta_stream(from)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed();

        GuardedStream {
            inner,
            _guard: guard,
        }
        .boxed()
    }

    async fn clock_and_state(&self) -> peer_gossip_store::Result<StateSnapshot> {
        let _guard = self.recorder.begin(StoreCall::ClockAndState);
        self.pause().await;
        if self.recorder.take_failure() {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.clock_and_state().await
    }

    async fn latest_clock(&self) -> peer_gossip_store::Result<VectorClock> {
        let _guard = self.recorder.begin(StoreCall::LatestClock);
        self.pause().await;
        if self.recorder.take_failure() {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.latest_clock().await
    }

    fn add_clock_listener(&self, listener: ClockListener) -> ListenerId {
        self.recorder.listeners_added.fetch_add(1, Ordering::SeqCst);
        self.inner.add_clock_listener(listener)
    }

    fn remove_clock_listener(&self, id: ListenerId) -> bool {
        self.recorder
            .listeners_removed
            .fetch_add(1, Ordering::SeqCst);
        self.inner.remove_clock_listener(id)
    }
}

/// The receiving end of a push session, backed by its own [`MemoryStore`].
///
/// Applies incoming frames the way a pulling replica would and answers
/// with Presentations.
pub struct RemotePeer {
    pub id: NodeId,
    pub store: Arc<MemoryStore>,
}

impl RemotePeer {
    /// Remote with an empty store.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Apply one frame. Returns whether it changed the local state.
    pub fn apply(&self, frame: &OutboundFrame) -> Result<bool, StoreError> {
        match frame {
            OutboundFrame::Deltas(deltas) => {
                let mut changed = false;
                for delta in deltas {
                    changed |= self.store.apply_delta(delta.clone())?;
                }
                Ok(changed)
            }
            OutboundFrame::Snapshot(snapshot) => self.store.apply_snapshot(snapshot),
            OutboundFrame::ClockOnly(_) => Ok(false),
        }
    }

    /// Presentation carrying our clock, optionally switching the pusher's mode.
    pub fn presentation(&self, mode: Option<PushMode>) -> Presentation {
        let clock = Some(self.store.clock());
        match mode {
            Some(PushMode::Eager) => Presentation::eager(clock),
            Some(PushMode::Lazy) => Presentation::lazy(clock),
            None => Presentation {
                remote_clock: clock,
                ..Presentation::default()
            },
        }
    }

    /// Send a Presentation over `transport`.
    pub async fn present<T>(&self, transport: &T, mode: Option<PushMode>) -> peer_gossip_sync::Result<()>
    where
        T: Transport + ?Sized,
    {
        let bytes = codec::encode_presentation(&self.presentation(mode))?;
        transport.send(bytes).await
    }

    /// Receive and apply frames until our clock covers `target`.
    ///
    /// Returns every frame received. Fails if the transport closes first.
    pub async fn pull_until<T>(
        &self,
        transport: &T,
        target: &VectorClock,
    ) -> peer_gossip_sync::Result<Vec<OutboundFrame>>
    where
        T: Transport + ?Sized,
    {
        let mut frames = Vec::new();
        while !self.store.clock().dominates_or_equals(target) {
            let bytes = transport.recv().await?.ok_or_else(|| {
                SyncError::TransportError("closed before reaching target clock".into())
            })?;
            let frame = codec::decode_frame(&bytes)?;
            self.apply(&frame)?;
            frames.push(frame);
        }
        Ok(frames)
    }
}
