//! Strict FIFO task runner with a concurrency of one.
//!
//! Every reconciliation attempt of a session goes through one
//! [`SerialTaskQueue`], whichever event triggered it. That is what keeps
//! store reads and clock updates of one session from interleaving.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, SyncError};

struct QueuedTask {
    id: u64,
    work: BoxFuture<'static, Result<()>>,
    done: oneshot::Sender<Result<()>>,
}

/// Completion signal of one queued unit of work.
///
/// Resolves to the unit's own result, or to [`SyncError::Cancelled`] if the
/// queue shut down before the unit finished.
pub struct TaskHandle {
    id: u64,
    rx: oneshot::Receiver<Result<()>>,
}

impl TaskHandle {
    /// Position of the unit in enqueue order.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SyncError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs queued futures one at a time, in enqueue order.
///
/// - Enqueue never blocks and never waits for earlier work.
/// - A failing or panicking unit only fails its own [`TaskHandle`].
/// - Dropping the queue, or calling [`SerialTaskQueue::shutdown`], stops the
///   worker and drops the in-flight unit along with everything still queued.
///
/// Must be created inside a tokio runtime.
pub struct SerialTaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    worker: JoinHandle<()>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
}

impl SerialTaskQueue {
    /// Create a queue and spawn its worker.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_worker(rx, Arc::clone(&pending)));

        Self {
            tx,
            worker,
            next_id: AtomicU64::new(0),
            pending,
        }
    }

    /// Schedule a unit of work behind everything already queued.
    pub fn enqueue<F>(&self, work: F) -> TaskHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = oneshot::channel();
        let task = QueuedTask {
            id,
            work: work.boxed(),
            done,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            // Worker is gone; the dropped `done` sender cancels the handle.
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        TaskHandle { id, rx }
    }

    /// Units enqueued but not yet completed, including the one in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop the worker. Idempotent.
    pub fn shutdown(&self) {
        self.worker.abort();
    }

    /// Whether the worker has stopped.
    pub fn is_shutdown(&self) -> bool {
        self.worker.is_finished()
    }
}

impl Default for SerialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialTaskQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<QueuedTask>, pending: Arc<AtomicUsize>) {
    while let Some(task) = rx.recv().await {
        let result = match AssertUnwindSafe(task.work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(SyncError::TaskFailed(panic_message(panic.as_ref()))),
        };
        if let Err(e) = &result {
            tracing::debug!(task = task.id, error = %e, "queued task failed");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
        // The caller may have stopped listening; that is fine.
        let _ = task.done.send(result);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_owned()
    }
}
