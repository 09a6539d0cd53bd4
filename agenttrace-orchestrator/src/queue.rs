use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::model::Submission;

struct QueuedSubmission {
    submitted_at: DateTime<Utc>,
    submission: Submission,
}

impl PartialEq for QueuedSubmission {
    fn eq(&self, other: &Self) -> bool {
        self.submitted_at == other.submitted_at
    }
}
impl Eq for QueuedSubmission {}

impl PartialOrd for QueuedSubmission {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedSubmission {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; reverse so the earliest `submitted_at`
        // (oldest, i.e. first-in) pops first — FIFO by submission time.
        other.submitted_at.cmp(&self.submitted_at)
    }
}

/// `queue(submission)` (spec.md §4.5 "Submission handler"): a FIFO priority
/// queue keyed by `submitted_at`, drained by the worker pool.
pub struct SubmissionQueue {
    inner: Mutex<BinaryHeap<QueuedSubmission>>,
    notify: Notify,
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(BinaryHeap::new()), notify: Notify::new() }
    }

    pub async fn push(&self, submission: Submission) {
        let submitted_at = submission.submitted_at;
        self.inner.lock().await.push(QueuedSubmission { submitted_at, submission });
        self.notify.notify_one();
    }

    /// Waits for and pops the oldest-queued submission.
    pub async fn pop(&self) -> Submission {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.pop() {
                    return item.submission;
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::ids::SubmissionId;
    use crate::model::EndpointConfig;

    fn submission(submitted_at: DateTime<Utc>) -> Submission {
        Submission {
            id: SubmissionId::new(),
            submitter_email: "a@b.com".into(),
            organization: None,
            agent_name: "agent".into(),
            agent_version: "1.0.0".into(),
            endpoint: EndpointConfig::Local { module: "m".into() },
            category_ids: vec![],
            terms_accepted: true,
            submitted_at,
        }
    }

    #[tokio::test]
    async fn pops_in_submission_time_order_regardless_of_push_order() {
        let queue = SubmissionQueue::new();
        let t0 = Utc::now();
        let s_newest = submission(t0 + chrono::Duration::seconds(10));
        let s_oldest = submission(t0);
        let s_middle = submission(t0 + chrono::Duration::seconds(5));

        let oldest_id = s_oldest.id;
        let middle_id = s_middle.id;
        let newest_id = s_newest.id;

        queue.push(s_newest).await;
        queue.push(s_oldest).await;
        queue.push(s_middle).await;

        assert_eq!(queue.pop().await.id, oldest_id);
        assert_eq!(queue.pop().await.id, middle_id);
        assert_eq!(queue.pop().await.id, newest_id);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = std::sync::Arc::new(SubmissionQueue::new());
        let q2 = queue.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push(submission(Utc::now())).await;
        let popped = handle.await.unwrap();
        assert!(popped.terms_accepted);
    }
}
