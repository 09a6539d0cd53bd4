use std::sync::Arc;
use std::time::Duration;

use agenttrace_core::domain::ids::{Digest32, EventId, OrganizationId};
use agenttrace_core::error::{CoreError, Result};
use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::batch::CaptureQueue;
use crate::chain::ChainState;
use crate::checkpoint::{self, Timestamper};
use crate::dedup::DedupFilter;
use crate::merkle::{self, MerkleTree};
use crate::model::{AuditEvent, AuditEventDraft, Checkpoint, MerkleProof};
use crate::storage::AuditStorage;

/// Filter for `query_events` (spec.md §4.3 contract: `query_events(filter)`
/// returning an ordered sequence). Every field is optional; an empty filter
/// returns the full day range for the organization.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub organization_id: Option<OrganizationId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub actor_id: Option<String>,
    pub event_type: Option<String>,
}

/// Top-level C3 service composing chain maintenance, deduplication,
/// batching, storage, checkpoints, and verification behind the contract
/// named in spec.md §4.3: `capture_event`, `query_events`, `get_event`,
/// `verify_chain`, `create_checkpoint`, `generate_proof`, `verify_proof`.
pub struct AuditLog {
    storage: Arc<dyn AuditStorage>,
    timestamper: Arc<dyn Timestamper>,
    chain: ChainState,
    dedup: DedupFilter,
    queue: CaptureQueue,
    batch_size: usize,
    batch_interval: Duration,
    max_clock_skew_secs: i64,
}

impl AuditLog {
    pub fn new(
        storage: Arc<dyn AuditStorage>,
        timestamper: Arc<dyn Timestamper>,
        batch_size: usize,
        batch_interval: Duration,
        dedup_window_secs: u64,
        max_clock_skew_secs: i64,
    ) -> Self {
        Self {
            storage,
            timestamper,
            chain: ChainState::new(),
            dedup: DedupFilter::new(dedup_window_secs),
            queue: CaptureQueue::new(),
            batch_size,
            batch_interval,
            max_clock_skew_secs,
        }
    }

    /// Enqueues `draft` for capture; the returned future resolves once the
    /// event has been chained and written durably (spec.md §4.3 contract:
    /// "returning a promise resolved when the event is durable and
    /// chained"). Duplicate drafts within the dedup window resolve
    /// immediately without touching the chain.
    pub async fn capture_event(&self, draft: AuditEventDraft) -> Result<AuditEvent> {
        let key = draft.dedup_key(self.dedup.window_secs());
        if self.dedup.seen(&key) {
            metrics::counter!("audit_capture_deduplicated").increment(1);
            return Err(CoreError::Validation("duplicate event suppressed".into()));
        }
        let event = self.chain.capture(self.storage.as_ref(), draft).await?;
        metrics::counter!("audit_events_captured").increment(1);
        info!(event_id = %event.event_id, org = %event.organization_id, "audit event captured");
        Ok(event)
    }

    /// Background flusher loop: drains the capture queue and links batches
    /// onto the chain. Intended to run as a single long-lived task fed by
    /// `enqueue`; `capture_event` above is the synchronous fast path used
    /// when immediate durability is required by the caller.
    pub async fn enqueue(&self, draft: AuditEventDraft) {
        self.queue.push(draft).await;
    }

    pub async fn run_flusher(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                batch = self.queue.drain_batch(self.batch_size, self.batch_interval) => {
                    for draft in batch {
                        if let Err(e) = self.capture_event(draft).await {
                            warn!(error = %e, "audit flusher capture failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    let remaining = self.queue.drain_all().await;
                    for draft in remaining {
                        if let Err(e) = self.capture_event(draft).await {
                            warn!(error = %e, "audit flusher drain capture failed");
                        }
                    }
                    break;
                }
            }
        }
    }

    pub async fn get_event(&self, org: OrganizationId, date: NaiveDate, event_id: EventId) -> Result<Option<AuditEvent>> {
        self.storage.read_event(org, date, event_id).await
    }

    pub async fn query_events(&self, filter: QueryFilter) -> Result<Vec<AuditEvent>> {
        let org = filter
            .organization_id
            .ok_or_else(|| CoreError::Validation("organization_id is required".into()))?;
        let from = filter.from.unwrap_or(filter.to.unwrap_or_else(|| chrono::Utc::now().date_naive()));
        let to = filter.to.unwrap_or(from);

        let mut events = Vec::new();
        let mut date = from;
        while date <= to {
            let mut day_events = self.storage.list_events(org, date).await?;
            day_events.retain(|e| {
                filter.actor_id.as_deref().map(|id| e.actor.id == id).unwrap_or(true)
                    && filter
                        .event_type
                        .as_deref()
                        .map(|t| e.classification.event_type == t)
                        .unwrap_or(true)
            });
            events.extend(day_events);
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(events)
    }

    pub async fn verify_chain(&self, org: OrganizationId, from: NaiveDate, to: NaiveDate) -> Result<crate::model::VerifyChainReport> {
        crate::verify::verify_chain(self.storage.as_ref(), org, from, to, self.max_clock_skew_secs).await
    }

    pub async fn create_checkpoint(&self, org: OrganizationId, date: NaiveDate) -> Result<Checkpoint> {
        checkpoint::create_checkpoint(self.storage.as_ref(), self.timestamper.as_ref(), org, date).await
    }

    /// `generate_proof(event_id)`: builds the Merkle tree for the event's
    /// day and returns the inclusion proof for that leaf.
    pub async fn generate_proof(&self, org: OrganizationId, date: NaiveDate, event_id: EventId) -> Result<MerkleProof> {
        let events = self.storage.list_events(org, date).await?;
        let index = events
            .iter()
            .position(|e| e.event_id == event_id)
            .ok_or_else(|| CoreError::NotFound(format!("event {event_id} not found on {date}")))?;
        let leaves: Vec<Digest32> = events.iter().map(|e| e.hash).collect();
        let tree = MerkleTree::build(leaves);
        tree.proof(index).ok_or_else(|| CoreError::Internal("proof generation failed".into()))
    }

    pub fn verify_proof(&self, proof: &MerkleProof, root: Digest32) -> bool {
        merkle::verify_proof(proof, root)
    }
}
