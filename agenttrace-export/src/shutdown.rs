use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("shutdown timed out after {0:?}")]
    Timeout(Duration),
}

/// Coordinates a graceful `shutdown(timeout)` over the export pipeline (spec.md
/// §4.2): stop accepting, drain the queue, flush partial batches, join
/// workers. Adapted from the teacher's `ShutdownCoordinator` component/hook
/// registration pattern, narrowed to the single worker-drain use case export
/// needs (no arbitrary hook registration).
pub struct ShutdownCoordinator {
    accepting: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    is_shutting_down: Arc<AtomicBool>,
    flush: Mutex<Option<Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            accepting: Arc::new(AtomicBool::new(true)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            flush: Mutex::new(None),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn track_enqueued(&self) -> EnqueueGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        EnqueueGuard {
            counter: self.in_flight.clone(),
        }
    }

    /// Registers the closure that flushes any partial batch still held by a
    /// worker. Called once during pipeline construction.
    pub async fn on_flush<F>(&self, flush: F)
    where
        F: FnOnce() -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    {
        *self.flush.lock().await = Some(Box::new(flush));
    }

    /// Stops accepting new spans, waits (up to `timeout`) for the in-flight
    /// queue to drain, then runs the registered flush. Returns
    /// `ShutdownError::Timeout` if spans remained queued when the deadline
    /// passed — callers are expected to dead-letter whatever remains.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        self.accepting.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        let drained = loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        };

        if let Some(flush) = self.flush.lock().await.take() {
            flush().await;
        }

        if drained {
            Ok(())
        } else {
            Err(ShutdownError::Timeout(timeout))
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EnqueueGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for EnqueueGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
