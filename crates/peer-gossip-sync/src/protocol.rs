//! Push session state machine.
//!
//! Decides, for one remote peer, what to send next: deltas, a full
//! snapshot, or just a clock announcement. All reconciliation entry points
//! are meant to run on the session's [`SerialTaskQueue`](crate::SerialTaskQueue);
//! see [`crate::session`] for the driver that wires them up.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

use peer_gossip_core::{NodeId, VectorClock};
use peer_gossip_store::{ClockListener, DeltaStore, ListenerId};

use crate::error::{Result, SyncError};
use crate::messages::{OutboundFrame, Presentation};

/// How the remote wants to be fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// Push delta payloads as soon as they exist.
    #[default]
    Eager,
    /// Announce clocks only; the remote pulls.
    Lazy,
}

/// Retry behavior for single-shot store calls.
///
/// Only transient store errors are retried. Delta streams never are.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }

    /// Retry up to `max_attempts` times total, doubling the delay each time.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::none()
        }
    }

    /// Delay before retrying after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Configuration for push sessions.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Outbound frames buffered before the session waits on the consumer.
    pub outbound_capacity: usize,
    /// Inbound Presentations buffered before senders wait.
    pub inbound_capacity: usize,
    /// Retry policy for `latest_clock` and `clock_and_state`.
    pub store_retry: RetryPolicy,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            inbound_capacity: 16,
            store_retry: RetryPolicy::default(),
        }
    }
}

impl PushConfig {
    /// Set the outbound frame buffer size (at least 1).
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the inbound Presentation buffer size (at least 1).
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set the retry policy for single-shot store reads.
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }
}

/// Clocks tracked by a push session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Latest observed local clock.
    pub local_clock: Option<VectorClock>,
    /// Everything the remote has told us it knows, merged.
    pub remote_clock: Option<VectorClock>,
    /// Clock we believe we last communicated to the remote.
    pub pushed_clock: Option<VectorClock>,
}

impl SessionState {
    /// Whether the remote may be missing something we have.
    ///
    /// Nothing is known locally yet: no. Remote or pushed clock unknown: yes.
    /// Otherwise only when local is at or ahead of remote and differs from
    /// both the remote clock and what was already pushed.
    pub fn remote_needs_update(&self) -> bool {
        let Some(local) = &self.local_clock else {
            return false;
        };
        match (&self.remote_clock, &self.pushed_clock) {
            (Some(remote), Some(pushed)) => {
                local.dominates_or_equals(remote)
                    && !local.is_identical(remote)
                    && !local.is_identical(pushed)
            }
            _ => true,
        }
    }

    fn record_pushed(&mut self, clock: &VectorClock) {
        self.pushed_clock = Some(match self.pushed_clock.take() {
            Some(pushed) => pushed.merge(clock),
            None => clock.clone(),
        });
    }

    fn merge_remote(&mut self, clock: &VectorClock) {
        self.remote_clock = Some(match self.remote_clock.take() {
            Some(remote) => remote.merge(clock),
            None => clock.clone(),
        });
    }
}

/// Receiving ends of a session's output.
pub struct SessionOutput {
    /// Frames in emission order.
    pub frames: mpsc::Receiver<OutboundFrame>,
    /// Terminal error, delivered at most once.
    pub outcome: oneshot::Receiver<SyncError>,
}

/// Push side of the protocol for one remote peer.
///
/// Holds the session clocks, the push mode and the outbound channel. The
/// reconciliation methods are not reentrant: callers must run them one at a
/// time, which [`spawn_session`](crate::spawn_session) does through a serial
/// queue.
pub struct PushSession<S: DeltaStore + ?Sized> {
    local: NodeId,
    peer: NodeId,
    store: Arc<S>,
    config: PushConfig,
    state: Mutex<SessionState>,
    mode: watch::Sender<PushMode>,
    output: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    outcome: Mutex<Option<oneshot::Sender<SyncError>>>,
    listener: Mutex<Option<ListenerId>>,
    ended: AtomicBool,
}

impl<S: DeltaStore + ?Sized> PushSession<S> {
    /// Create a session in eager mode with every clock unset.
    pub fn new(local: NodeId, peer: NodeId, store: Arc<S>, config: PushConfig) -> (Self, SessionOutput) {
        let (frames_tx, frames) = mpsc::channel(config.outbound_capacity.max(1));
        let (outcome_tx, outcome) = oneshot::channel();
        let (mode, _) = watch::channel(PushMode::Eager);

        let session = Self {
            local,
            peer,
            store,
            config,
            state: Mutex::new(SessionState::default()),
            mode,
            output: Mutex::new(Some(frames_tx)),
            outcome: Mutex::new(Some(outcome_tx)),
            listener: Mutex::new(None),
            ended: AtomicBool::new(false),
        };
        (session, SessionOutput { frames, outcome })
    }

    /// Identity of the local replica.
    pub fn local_id(&self) -> NodeId {
        self.local
    }

    /// Identity of the remote peer.
    pub fn peer_id(&self) -> NodeId {
        self.peer
    }

    /// Session configuration.
    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Copy of the current session clocks.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Current push mode.
    pub fn mode(&self) -> PushMode {
        *self.mode.borrow()
    }

    /// Whether [`PushSession::shutdown`] has run.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Subscribe to the store's clock changes on behalf of this session.
    ///
    /// The subscription is dropped by [`PushSession::shutdown`].
    pub fn attach_listener(&self, listener: ClockListener) {
        let id = self.store.add_clock_listener(listener);
        let previous = self.listener.lock().replace(id);
        if let Some(previous) = previous {
            self.store.remove_clock_listener(previous);
        }
    }

    /// Record a new local clock. Follow with [`PushSession::reconcile`].
    pub fn set_local_clock(&self, clock: VectorClock) {
        tracing::trace!(clock = ?clock, "local clock changed");
        self.state.lock().local_clock = Some(clock);
    }

    /// Apply a Presentation from the remote.
    ///
    /// Lazy is applied before eager, so eager wins when both are set. The
    /// remote clock is merged into what we already know, never replaced.
    /// Returns whether a [`PushSession::refresh_and_reconcile`] is due.
    pub fn apply_presentation(&self, presentation: &Presentation) -> Result<bool> {
        presentation
            .validate_limits()
            .map_err(|reason| SyncError::InvalidMessage(reason.into()))?;

        if presentation.start_lazy {
            self.mode.send_replace(PushMode::Lazy);
        }
        if presentation.start_eager {
            self.mode.send_replace(PushMode::Eager);
        }
        if let Some(clock) = &presentation.remote_clock {
            self.state.lock().merge_remote(clock);
        }

        tracing::debug!(
            remote_clock = ?presentation.remote_clock,
            mode = ?self.mode(),
            "got presentation"
        );
        Ok(presentation.triggers_reconcile())
    }

    /// Re-read the local clock from the store, then reconcile.
    pub async fn refresh_and_reconcile(&self) -> Result<()> {
        let clock = self
            .with_retry("latest_clock", || self.store.latest_clock())
            .await?;
        self.set_local_clock(clock);
        self.reconcile().await
    }

    /// Bring the remote up to date if it needs it.
    pub async fn reconcile(&self) -> Result<()> {
        let needs_update = self.state.lock().remote_needs_update();
        if needs_update {
            self.update_remote().await
        } else {
            tracing::trace!("remote is up to date");
            Ok(())
        }
    }

    async fn update_remote(&self) -> Result<()> {
        if self.mode() == PushMode::Lazy {
            let clock = self
                .with_retry("latest_clock", || self.store.latest_clock())
                .await?;
            tracing::debug!(clock = ?clock, "lazy: announcing clock");
            return self.emit(OutboundFrame::ClockOnly(clock)).await;
        }

        self.push_deltas().await?;

        let (needs_update, local, already_pushed) = {
            let state = self.state.lock();
            let already_pushed = match (&state.local_clock, &state.pushed_clock) {
                (Some(local), Some(pushed)) => local.is_identical(pushed),
                _ => false,
            };
            (
                state.remote_needs_update(),
                state.local_clock.clone(),
                already_pushed,
            )
        };
        if !needs_update {
            return Ok(());
        }

        match self.mode() {
            PushMode::Eager if already_pushed => {
                tracing::trace!("deltas already cover the local clock");
                Ok(())
            }
            PushMode::Eager => {
                let snapshot = self
                    .with_retry("clock_and_state", || self.store.clock_and_state())
                    .await?;
                if snapshot.clock.is_empty() {
                    return Ok(());
                }
                tracing::debug!(clock = ?snapshot.clock, "sending clock and state");
                self.state.lock().pushed_clock = Some(snapshot.clock.clone());
                self.emit(OutboundFrame::Snapshot(snapshot)).await
            }
            PushMode::Lazy => match local {
                Some(clock) => {
                    tracing::debug!(clock = ?clock, "switched to lazy: announcing clock");
                    self.emit(OutboundFrame::ClockOnly(clock)).await
                }
                None => Ok(()),
            },
        }
    }

    /// Stream outstanding deltas to the remote until the stream ends or the
    /// remote asks for lazy mode.
    async fn push_deltas(&self) -> Result<()> {
        let from = self.state.lock().remote_clock.clone();
        let mut deltas = self.store.delta_stream(from.as_ref());
        let went_lazy = until_lazy(self.mode.subscribe());
        tokio::pin!(went_lazy);

        let mut pushed = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = &mut went_lazy => {
                    tracing::debug!(pushed, "switched to lazy: stopped pushing deltas");
                    break;
                }
                next = deltas.next() => match next {
                    Some(Ok(entry)) => {
                        self.state.lock().record_pushed(&entry.resulting_clock());
                        self.emit(OutboundFrame::delta(entry)).await?;
                        pushed += 1;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },
            }
        }
        drop(deltas);

        if pushed > 0 {
            tracing::debug!(pushed, "pushed deltas");
        }
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = peer_gossip_store::Result<T>>,
    {
        let policy = &self.config.store_retry;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(op, attempt, ?delay, error = %e, "store call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn emit(&self, frame: OutboundFrame) -> Result<()> {
        if self.is_ended() {
            return Err(SyncError::SessionEnded);
        }
        let output = self.output.lock().clone();
        let output = output.ok_or(SyncError::SessionEnded)?;
        // Peers reject oversized frames on decode; fail here instead.
        frame
            .validate_limits()
            .map_err(|reason| SyncError::InvalidMessage(reason.into()))?;

        tracing::trace!(kind = ?frame.kind(), "emitting frame");
        output
            .send(frame)
            .await
            .map_err(|_| SyncError::SessionEnded)
    }

    /// Sender half of the outbound channel, while the session is live.
    pub(crate) fn outbound(&self) -> Option<mpsc::Sender<OutboundFrame>> {
        self.output.lock().clone()
    }

    /// End the session.
    ///
    /// Only the first call has any effect: it detaches the store listener,
    /// delivers `error` (if any) to the output and closes the frame channel.
    /// Returns whether this call ended the session.
    pub fn shutdown(&self, error: Option<SyncError>) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }

        match &error {
            Some(e) => tracing::error!(error = %e, "push session failed"),
            None => tracing::debug!("push session ended"),
        }

        let listener = self.listener.lock().take();
        if let Some(id) = listener {
            self.store.remove_clock_listener(id);
        }

        let outcome = self.outcome.lock().take();
        if let (Some(outcome), Some(error)) = (outcome, error) {
            // Nobody listening means nobody cares.
            let _ = outcome.send(error);
        }

        self.output.lock().take();
        true
    }
}

/// Resolves once the mode is lazy. Never resolves if the session is gone.
async fn until_lazy(mut mode: watch::Receiver<PushMode>) {
    loop {
        let lazy = *mode.borrow_and_update() == PushMode::Lazy;
        if lazy {
            return;
        }
        if mode.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peer_gossip_core::{ActorId, DeltaEntry, StateSnapshot};
    use peer_gossip_store::{DeltaStream, MemoryStore, StoreError};
    use std::sync::atomic::AtomicU32;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_entries(entries.iter().map(|(a, n)| (*a, *n)))
    }

    fn session_with(
        store: Arc<MemoryStore>,
        config: PushConfig,
    ) -> (Arc<PushSession<MemoryStore>>, SessionOutput) {
        let (session, output) =
            PushSession::new(NodeId::from_bytes([1; 32]), NodeId::from_bytes([2; 32]), store, config);
        (Arc::new(session), output)
    }

    fn drain(output: &mut SessionOutput) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = output.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_needs_update_predicate() {
        let mut state = SessionState::default();
        assert!(!state.remote_needs_update());

        state.local_clock = Some(clock(&[("A", 1)]));
        assert!(state.remote_needs_update());

        state.remote_clock = Some(clock(&[("A", 1)]));
        assert!(state.remote_needs_update(), "pushed clock still unknown");

        state.pushed_clock = Some(clock(&[("A", 1)]));
        assert!(!state.remote_needs_update());

        state.local_clock = Some(clock(&[("A", 2)]));
        assert!(state.remote_needs_update());

        // Remote ahead or concurrent: nothing for us to push.
        state.remote_clock = Some(clock(&[("A", 3)]));
        assert!(!state.remote_needs_update());
        state.remote_clock = Some(clock(&[("B", 1)]));
        assert!(!state.remote_needs_update());
    }

    #[test]
    fn test_presentation_merges_remote_and_eager_wins() {
        let store = Arc::new(MemoryStore::new());
        let (session, _output) = session_with(store, PushConfig::default());

        assert!(session
            .apply_presentation(&Presentation::lazy(Some(clock(&[("A", 2)]))))
            .unwrap());
        assert_eq!(session.mode(), PushMode::Lazy);

        let both = Presentation {
            remote_clock: Some(clock(&[("A", 1), ("B", 1)])),
            start_lazy: true,
            start_eager: true,
        };
        session.apply_presentation(&both).unwrap();
        assert_eq!(session.mode(), PushMode::Eager);
        assert_eq!(
            session.state().remote_clock,
            Some(clock(&[("A", 2), ("B", 1)]))
        );

        assert!(!session.apply_presentation(&Presentation::lazy(None)).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_remote_gets_snapshot_when_no_deltas() {
        let store = Arc::new(MemoryStore::new());
        store.apply_local(&ActorId::from("A"), &b"x"[..]);
        store.compact();

        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        session.set_local_clock(clock(&[("A", 1)]));
        session.reconcile().await.unwrap();

        let frames = drain(&mut output);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Snapshot(snapshot) => assert_eq!(snapshot.clock, clock(&[("A", 1)])),
            other => panic!("expected snapshot, got {other:?}"),
        }
        assert_eq!(session.state().pushed_clock, Some(clock(&[("A", 1)])));
    }

    #[tokio::test]
    async fn test_in_sync_remote_gets_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (session, mut output) = session_with(store, PushConfig::default());
        {
            let mut state = session.state.lock();
            state.local_clock = Some(clock(&[("A", 2)]));
            state.remote_clock = Some(clock(&[("A", 2)]));
            state.pushed_clock = Some(clock(&[("A", 2)]));
        }

        session.reconcile().await.unwrap();
        assert!(drain(&mut output).is_empty());
    }

    #[tokio::test]
    async fn test_lazy_presentation_announces_clock_once() {
        let store = Arc::new(MemoryStore::new());
        store.apply_local(&ActorId::from("A"), &b"a"[..]);
        store
            .apply_delta(DeltaEntry::new(clock(&[("A", 1)]), "B", &b"b"[..]))
            .unwrap();

        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        let trigger = session
            .apply_presentation(&Presentation::lazy(Some(clock(&[("B", 1)]))))
            .unwrap();
        assert!(trigger);
        session.refresh_and_reconcile().await.unwrap();

        assert_eq!(
            drain(&mut output),
            vec![OutboundFrame::ClockOnly(clock(&[("A", 1), ("B", 1)]))]
        );
        assert_eq!(session.state().pushed_clock, None);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused_before_sending() {
        use crate::messages::limits::MAX_CLOCK_ACTORS;

        let wide = VectorClock::from_entries((0..=MAX_CLOCK_ACTORS).map(|i| (format!("actor-{i}"), 1)));
        let store = Arc::new(MemoryStore::new());
        store
            .apply_delta(DeltaEntry::new(wide, "A", &b"x"[..]))
            .unwrap();

        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        session
            .apply_presentation(&Presentation::lazy(Some(VectorClock::new())))
            .unwrap();
        let result = session.refresh_and_reconcile().await;

        assert!(matches!(result, Err(SyncError::InvalidMessage(_))));
        assert!(drain(&mut output).is_empty());
    }

    #[tokio::test]
    async fn test_deltas_cover_local_so_no_snapshot_follows() {
        let store = Arc::new(MemoryStore::new());
        store.apply_local(&ActorId::from("A"), &b"1"[..]);
        store.apply_local(&ActorId::from("A"), &b"2"[..]);

        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        session.refresh_and_reconcile().await.unwrap();

        let frames = drain(&mut output);
        assert_eq!(frames.len(), 2);
        assert!(frames
            .iter()
            .all(|f| matches!(f, OutboundFrame::Deltas(d) if d.len() == 1)));
        assert_eq!(session.state().pushed_clock, Some(clock(&[("A", 2)])));
    }

    #[tokio::test]
    async fn test_only_missing_deltas_are_pushed() {
        let store = Arc::new(MemoryStore::new());
        for payload in [&b"1"[..], &b"2"[..], &b"3"[..]] {
            store.apply_local(&ActorId::from("A"), payload);
        }

        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        session
            .apply_presentation(&Presentation::clock(clock(&[("A", 2)])))
            .unwrap();
        session.refresh_and_reconcile().await.unwrap();

        let frames = drain(&mut output);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].clock(), Some(clock(&[("A", 3)])));
    }

    #[tokio::test]
    async fn test_pushed_clock_is_monotonic() {
        let store = Arc::new(MemoryStore::new());
        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());

        let mut last = VectorClock::new();
        for (i, author) in ["A", "B", "A", "C", "B"].iter().enumerate() {
            store.apply_local(&ActorId::from(*author), vec![i as u8]);
            session.refresh_and_reconcile().await.unwrap();
            drain(&mut output);

            let pushed = session.state().pushed_clock.unwrap();
            assert!(pushed.dominates_or_equals(&last));
            last = pushed;
        }
        assert_eq!(last, store.clock());
    }

    #[tokio::test]
    async fn test_switch_to_lazy_stops_delta_push() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..20u8 {
            store.apply_local(&ActorId::from("A"), vec![i]);
        }

        let config = PushConfig::default().with_outbound_capacity(1);
        let (session, mut output) = session_with(Arc::clone(&store), config);
        session.set_local_clock(store.clock());

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.reconcile().await })
        };

        let first = output.frames.recv().await.unwrap();
        assert!(matches!(first, OutboundFrame::Deltas(_)));
        session.apply_presentation(&Presentation::lazy(None)).unwrap();

        let mut after_switch = Vec::new();
        loop {
            let frame = output.frames.recv().await.unwrap();
            let done = matches!(frame, OutboundFrame::ClockOnly(_));
            after_switch.push(frame);
            if done {
                break;
            }
        }
        task.await.unwrap().unwrap();

        let deltas = after_switch
            .iter()
            .filter(|f| matches!(f, OutboundFrame::Deltas(_)))
            .count();
        assert!(deltas <= 1, "kept pushing after lazy switch: {deltas}");
        assert_eq!(
            after_switch.last(),
            Some(&OutboundFrame::ClockOnly(store.clock()))
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (session, mut output) = session_with(Arc::clone(&store), PushConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        session.attach_listener(tx);
        assert_eq!(store.listener_count(), 1);

        assert!(session.shutdown(Some(SyncError::Decode("bad".into()))));
        assert!(!session.shutdown(Some(SyncError::Cancelled)));
        assert!(!session.shutdown(None));

        assert_eq!(store.listener_count(), 0);
        assert!(matches!(output.outcome.await, Ok(SyncError::Decode(_))));
        assert!(output.frames.recv().await.is_none());
        assert!(matches!(
            session.emit(OutboundFrame::ClockOnly(VectorClock::new())).await,
            Err(SyncError::SessionEnded)
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    /// Fails `latest_clock` a fixed number of times with a transient error.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DeltaStore for FlakyStore {
        fn delta_stream(&self, from: Option<&VectorClock>) -> DeltaStream {
            self.inner.delta_stream(from)
        }

        async fn clock_and_state(&self) -> peer_gossip_store::Result<StateSnapshot> {
            self.inner.clock_and_state().await
        }

        async fn latest_clock(&self) -> peer_gossip_store::Result<VectorClock> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("busy".into()));
            }
            self.inner.latest_clock().await
        }

        fn add_clock_listener(&self, listener: ClockListener) -> ListenerId {
            self.inner.add_clock_listener(listener)
        }

        fn remove_clock_listener(&self, id: ListenerId) -> bool {
            self.inner.remove_clock_listener(id)
        }
    }

    fn flaky(failures: u32) -> Arc<FlakyStore> {
        let inner = MemoryStore::new();
        inner.apply_local(&ActorId::from("A"), &b"x"[..]);
        Arc::new(FlakyStore {
            inner,
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_transient_store_errors_are_retried() {
        let store = flaky(2);
        let config = PushConfig::default()
            .with_store_retry(RetryPolicy::exponential(3, Duration::from_millis(1)));
        let (session, mut output) = PushSession::new(
            NodeId::from_bytes([1; 32]),
            NodeId::from_bytes([2; 32]),
            Arc::clone(&store),
            config,
        );

        session.refresh_and_reconcile().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert!(output.frames.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_default_policy_does_not_retry() {
        let store = flaky(1);
        let (session, _output) = PushSession::new(
            NodeId::from_bytes([1; 32]),
            NodeId::from_bytes([2; 32]),
            Arc::clone(&store),
            PushConfig::default(),
        );

        let err = session.refresh_and_reconcile().await.unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
