//! Single-lane request queue.
//!
//! Tasks run one at a time in submission order on a dedicated worker task.
//! After every task, successful or not, the worker waits a fixed delay
//! before starting the next one so upstream never sees bursts.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::clock::Clock;
use super::error::FetchError;

/// Opaque unit of work run by the worker.
type QueuedTask = BoxFuture<'static, ()>;

/// Handle to the queue worker. Cloning shares the same lane.
///
/// The worker stops once every handle has been dropped and the remaining
/// tasks have drained.
#[derive(Clone)]
pub struct RequestQueue {
  tx: mpsc::UnboundedSender<QueuedTask>,
  pending: Arc<AtomicUsize>,
}

impl RequestQueue {
  /// Spawn the worker. Must be called from within a tokio runtime.
  pub fn new(clock: Arc<dyn Clock>, delay: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    tokio::spawn(run_worker(rx, clock, delay, Arc::clone(&pending)));

    Self { tx, pending }
  }

  /// Number of tasks submitted but not yet finished.
  pub fn pending(&self) -> usize {
    self.pending.load(Ordering::SeqCst)
  }

  /// Enqueue `task` and return a future resolving to its output.
  ///
  /// The task is enqueued immediately, before the returned future is polled.
  /// Dropping the returned future does not cancel the task. If the worker is
  /// gone, the task is dropped unrun when the returned future is polled or dropped.
  pub fn submit<F, T>(&self, task: F) -> impl Future<Output = Result<T, FetchError>> + Send + 'static
  where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    let (done_tx, done_rx) = oneshot::channel();
    let queued: QueuedTask = Box::pin(async move {
      // Ignore send errors - the submitter may have stopped waiting
      let _ = done_tx.send(task.await);
    });

    self.pending.fetch_add(1, Ordering::SeqCst);
    let rejected = self.tx.send(queued).err();
    if rejected.is_some() {
      self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    // A rejected task is dropped with the returned future, never inside `submit`
    async move {
      if rejected.is_some() {
        return Err(FetchError::QueueClosed);
      }
      done_rx.await.map_err(|_| FetchError::QueueClosed)
    }
  }
}

async fn run_worker(
  mut rx: mpsc::UnboundedReceiver<QueuedTask>,
  clock: Arc<dyn Clock>,
  delay: Duration,
  pending: Arc<AtomicUsize>,
) {
  while let Some(task) = rx.recv().await {
    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
      error!("Queued request panicked");
    }
    let remaining = pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    debug!(remaining, "Queued request finished");

    clock.sleep(delay).await;
  }
  debug!("Request queue closed");
}
