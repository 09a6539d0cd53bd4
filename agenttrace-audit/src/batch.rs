use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{self, Instant};

use crate::model::AuditEventDraft;

/// In-memory capture queue, flushed at `batch_size` or `batch_interval`
/// (spec.md §4.3 "Batching & deduplication"). Unlike the export pipeline's
/// queue, this one never drops under pressure — every captured event must
/// eventually reach the chain and storage.
pub struct CaptureQueue {
    inner: Mutex<VecDeque<AuditEventDraft>>,
    notify: Notify,
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, draft: AuditEventDraft) {
        let mut guard = self.inner.lock().await;
        guard.push_back(draft);
        drop(guard);
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Waits until `batch_size` drafts have accumulated or `batch_interval`
    /// elapses, whichever comes first, then drains whatever is available
    /// (possibly fewer than `batch_size`, possibly zero on a pure timeout).
    pub async fn drain_batch(&self, batch_size: usize, batch_interval: Duration) -> Vec<AuditEventDraft> {
        let deadline = Instant::now() + batch_interval;
        loop {
            {
                let guard = self.inner.lock().await;
                if guard.len() >= batch_size {
                    drop(guard);
                    return self.drain_up_to(batch_size).await;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return self.drain_up_to(batch_size).await;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = time::sleep(deadline - now) => {
                    return self.drain_up_to(batch_size).await;
                }
            }
        }
    }

    async fn drain_up_to(&self, max: usize) -> Vec<AuditEventDraft> {
        let mut guard = self.inner.lock().await;
        let n = guard.len().min(max.max(1));
        guard.drain(..n).collect()
    }

    pub async fn drain_all(&self) -> Vec<AuditEventDraft> {
        let mut guard = self.inner.lock().await;
        guard.drain(..).collect()
    }
}

impl Default for CaptureQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Actor, ActorType, Classification, EventCategory, Resource, Severity};
    use agenttrace_core::domain::ids::{EventId, OrganizationId};
    use chrono::Utc;

    fn draft() -> AuditEventDraft {
        AuditEventDraft {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: OrganizationId::new(),
            project_id: None,
            actor: Actor { actor_type: ActorType::User, id: "u1".into(), email: None, ip: None, user_agent: None },
            classification: Classification { category: EventCategory::Auth, event_type: "user.login".into(), severity: Severity::Info },
            resource: Resource { resource_type: "session".into(), id: "s1".into(), name: None },
            action: Action::Create,
            previous_state: None,
            new_state: None,
            request_id: "r1".into(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn drains_once_batch_size_reached() {
        let queue = CaptureQueue::new();
        for _ in 0..5 {
            queue.push(draft()).await;
        }
        let batch = queue.drain_batch(5, Duration::from_secs(5)).await;
        assert_eq!(batch.len(), 5);
    }

    #[tokio::test]
    async fn times_out_with_partial_batch() {
        let queue = CaptureQueue::new();
        queue.push(draft()).await;
        let batch = queue.drain_batch(100, Duration::from_millis(20)).await;
        assert_eq!(batch.len(), 1);
    }
}
