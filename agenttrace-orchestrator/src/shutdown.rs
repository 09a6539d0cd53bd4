use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Coordinates `stop(graceful)` over the worker pool (spec.md §4.5 "Graceful
/// shutdown"). Distinct from the export pipeline's `ShutdownCoordinator` (no
/// in-flight counter drain loop): the orchestrator instead cancels a shared
/// `CancellationToken` — the same primitive the teacher's `TaskExecutor` uses
/// per-task — and lets workers race the token against their current
/// execution rather than polling a counter.
pub struct ShutdownCoordinator {
    accepting: Arc<AtomicBool>,
    cancel: CancellationToken,
    persist: Mutex<Option<Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self { accepting: Arc::new(AtomicBool::new(true)), cancel: CancellationToken::new(), persist: Mutex::new(None) }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers the closure that snapshots in-progress submission state.
    /// Called once during orchestrator construction.
    pub async fn on_persist<F>(&self, persist: F)
    where
        F: FnOnce() -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    {
        *self.persist.lock().await = Some(Box::new(persist));
    }

    /// `stop(graceful=true)`: stops accepting new submissions, waits up to
    /// `grace_period` for `workers_done` to resolve (joined workers),
    /// persists in-progress state, then cancels anything still running.
    pub async fn stop_graceful<F>(&self, grace_period: Duration, workers_done: F)
    where
        F: std::future::Future<Output = ()>,
    {
        self.accepting.store(false, Ordering::SeqCst);
        info!("orchestrator shutdown: no longer accepting submissions, waiting up to {:?} for drain", grace_period);

        let drained = tokio::time::timeout(grace_period, workers_done).await.is_ok();
        if !drained {
            info!("grace period elapsed with executions still in flight; persisting state before cancelling");
        }
        if let Some(persist) = self.persist.lock().await.take() {
            persist().await;
        }
        if !drained {
            self.cancel.cancel();
        }
    }

    /// `stop(graceful=false)`: cancels active executions immediately.
    pub async fn stop_immediate(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(persist) = self.persist.lock().await.take() {
            persist().await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn graceful_stop_waits_for_drain_within_grace_period() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.stop_graceful(Duration::from_millis(200), async { tokio::time::sleep(Duration::from_millis(20)).await }).await;
        assert!(!coordinator.is_accepting());
        assert!(!coordinator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn graceful_stop_cancels_after_grace_period_elapses() {
        let coordinator = ShutdownCoordinator::new();
        coordinator
            .stop_graceful(Duration::from_millis(20), async { tokio::time::sleep(Duration::from_secs(5)).await })
            .await;
        assert!(coordinator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn immediate_stop_cancels_right_away() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.stop_immediate().await;
        assert!(coordinator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn persist_hook_runs_on_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let persisted = Arc::new(AtomicUsize::new(0));
        let p2 = persisted.clone();
        coordinator
            .on_persist(move || {
                Box::pin(async move {
                    p2.fetch_add(1, Ordering::SeqCst);
                })
            })
            .await;
        coordinator.stop_immediate().await;
        assert_eq!(persisted.load(Ordering::SeqCst), 1);
    }
}
