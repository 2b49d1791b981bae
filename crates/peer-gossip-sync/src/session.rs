//! Running push sessions.
//!
//! [`spawn_session`] starts a driver task that owns the session's serial
//! queue. Two producers feed the driver: the store's clock listener and the
//! inbound Presentation channel behind [`SessionSink`]. Every reconciliation
//! they trigger is enqueued, so at most one runs at a time.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::Future;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, Span};

use peer_gossip_core::{NodeId, VectorClock};
use peer_gossip_store::DeltaStore;

use crate::codec;
use crate::error::{Result, SyncError};
use crate::messages::{OutboundFrame, Presentation};
use crate::protocol::{PushConfig, PushSession, SessionOutput};
use crate::queue::{SerialTaskQueue, TaskHandle};

/// Both ends of a running session.
pub struct SessionHandle {
    /// Where inbound Presentations go.
    pub sink: SessionSink,
    /// Where outbound frames come from.
    pub source: SessionSource,
}

impl SessionHandle {
    /// Separate the two ends.
    pub fn split(self) -> (SessionSink, SessionSource) {
        (self.sink, self.source)
    }
}

/// Inbound side of a session.
///
/// Dropping every clone ends the session cleanly.
#[derive(Clone)]
pub struct SessionSink {
    tx: mpsc::Sender<Result<Presentation>>,
}

impl SessionSink {
    /// Deliver a Presentation.
    pub async fn send(&self, presentation: Presentation) -> Result<()> {
        self.forward(Ok(presentation)).await
    }

    /// Decode and deliver a Presentation.
    ///
    /// Undecodable bytes end the session with the decode error.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.forward(codec::decode_presentation(bytes)).await
    }

    /// End the session with an error, e.g. one raised by the transport.
    pub async fn fail(&self, error: SyncError) -> Result<()> {
        self.forward(Err(error)).await
    }

    /// Whether the session has stopped accepting input.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn forward(&self, item: Result<Presentation>) -> Result<()> {
        self.tx.send(item).await.map_err(|_| SyncError::SessionEnded)
    }
}

/// Outbound side of a session.
///
/// Yields frames in emission order, then the session's error if it failed,
/// then ends. Dropping it ends the session.
pub struct SessionSource {
    frames: mpsc::Receiver<OutboundFrame>,
    outcome: Option<oneshot::Receiver<SyncError>>,
}

impl SessionSource {
    fn new(output: SessionOutput) -> Self {
        Self {
            frames: output.frames,
            outcome: Some(output.outcome),
        }
    }

    /// Next frame, the terminal error, or `None` once the session is over.
    pub async fn recv(&mut self) -> Option<Result<OutboundFrame>> {
        self.next().await
    }
}

impl Stream for SessionSource {
    type Item = Result<OutboundFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.frames.poll_recv(cx) {
            Poll::Ready(Some(frame)) => return Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }

        let Some(outcome) = this.outcome.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(outcome).poll(cx) {
            Poll::Ready(result) => {
                this.outcome = None;
                Poll::Ready(result.ok().map(Err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start a push session towards `peer`.
///
/// Registers a clock listener on `store` and spawns the session driver on
/// the current tokio runtime.
pub fn spawn_session<S>(
    local: NodeId,
    peer: NodeId,
    store: Arc<S>,
    config: PushConfig,
) -> SessionHandle
where
    S: DeltaStore + ?Sized + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
    let (session, output) = PushSession::new(local, peer, store, config);
    let session = Arc::new(session);

    let (clock_tx, clock_rx) = mpsc::unbounded_channel();
    session.attach_listener(clock_tx);

    let span = tracing::info_span!("push_session", local = %local, peer = %peer);
    let driver = Driver {
        session,
        queue: SerialTaskQueue::new(),
        span: span.clone(),
    };
    tokio::spawn(driver.run(inbound_rx, clock_rx).instrument(span));

    SessionHandle {
        sink: SessionSink { tx: inbound_tx },
        source: SessionSource::new(output),
    }
}

struct Driver<S: DeltaStore + ?Sized> {
    session: Arc<PushSession<S>>,
    queue: SerialTaskQueue,
    span: Span,
}

impl<S: DeltaStore + ?Sized + 'static> Driver<S> {
    async fn run(
        self,
        mut inbound: mpsc::Receiver<Result<Presentation>>,
        mut clock_changes: mpsc::UnboundedReceiver<VectorClock>,
    ) {
        tracing::debug!("push session started");
        let outbound = self.session.outbound();
        let mut running: FuturesUnordered<TaskHandle> = FuturesUnordered::new();

        while !self.session.is_ended() {
            tokio::select! {
                Some(result) = running.next(), if !running.is_empty() => {
                    if let Err(e) = result {
                        self.fail(e);
                    }
                }
                Some(clock) = clock_changes.recv() => {
                    self.session.set_local_clock(clock);
                    let session = Arc::clone(&self.session);
                    running.push(self.enqueue(async move { session.reconcile().await }));
                }
                item = inbound.recv() => match item {
                    Some(Ok(presentation)) => match self.session.apply_presentation(&presentation) {
                        Ok(true) => {
                            let session = Arc::clone(&self.session);
                            running.push(
                                self.enqueue(async move { session.refresh_and_reconcile().await }),
                            );
                        }
                        Ok(false) => {}
                        Err(e) => self.fail(e),
                    },
                    Some(Err(e)) => self.fail(e),
                    None => {
                        tracing::debug!("inbound stream ended");
                        self.session.shutdown(None);
                    }
                },
                _ = outbound_closed(outbound.as_ref()) => {
                    tracing::debug!("outbound consumer went away");
                    self.session.shutdown(None);
                }
            }
        }

        self.queue.shutdown();
    }

    fn enqueue<F>(&self, work: F) -> TaskHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.queue.enqueue(work.instrument(self.span.clone()))
    }

    fn fail(&self, error: SyncError) {
        match error {
            // The consumer is gone; nothing left to report to.
            SyncError::SessionEnded | SyncError::Cancelled => self.session.shutdown(None),
            error => self.session.shutdown(Some(error)),
        };
    }
}

async fn outbound_closed(outbound: Option<&mpsc::Sender<OutboundFrame>>) {
    match outbound {
        Some(tx) => tx.closed().await,
        None => futures::future::pending().await,
    }
}
