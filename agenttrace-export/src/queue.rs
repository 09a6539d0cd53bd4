use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use agenttrace_core::domain::Span;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Bounded MPMC-ish queue backing `emit()`. On overflow the oldest entry is
/// dropped and a counter incremented (spec.md §4.2 "on queue-full policy is
/// `drop_oldest`").
pub struct BoundedSpanQueue {
    inner: Mutex<VecDeque<Span>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl BoundedSpanQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub async fn push(&self, span: Span) {
        let mut guard = self.inner.lock().await;
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("export_queue_dropped_oldest").increment(1);
        }
        guard.push_back(span);
        drop(guard);
        self.notify.notify_one();
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Waits until at least one span is present or `batch_interval` elapses,
    /// then drains up to `max` spans. Returns an empty vec on pure timeout
    /// with nothing queued.
    pub async fn drain_batch(&self, max: usize, batch_interval: Duration) -> Vec<Span> {
        let deadline = Instant::now() + batch_interval;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.len() >= max {
                    return guard.drain(..max).collect();
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let mut guard = self.inner.lock().await;
                let take = guard.len().min(max);
                return guard.drain(..take).collect();
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Drains everything immediately, used during shutdown.
    pub async fn drain_all(&self) -> Vec<Span> {
        let mut guard = self.inner.lock().await;
        guard.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
