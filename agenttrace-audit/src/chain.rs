use std::sync::Arc;

use agenttrace_core::domain::ids::{Digest32, OrganizationId};
use dashmap::DashMap;
use tokio::sync::Mutex;

use agenttrace_core::error::Result;

use crate::canonical::compute_hash;
use crate::model::{AuditEvent, AuditEventDraft};
use crate::storage::AuditStorage;

/// Per-organization append-only hash chain (spec.md §4.3 "Hash chain").
/// `last_hash` for an org not yet seen is `Digest32::ZERO`. A per-org
/// `tokio::sync::Mutex` serializes `capture` so concurrent writers can
/// never link two events to the same `previous_hash`.
#[derive(Default)]
pub struct ChainState {
    last_hash: DashMap<OrganizationId, Arc<Mutex<Digest32>>>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, org: OrganizationId) -> Arc<Mutex<Digest32>> {
        self.last_hash
            .entry(org)
            .or_insert_with(|| Arc::new(Mutex::new(Digest32::ZERO)))
            .clone()
    }

    /// Seeds the chain for `org` with the last hash known to storage (used on
    /// startup to resume a chain rather than restart it at `ZERO`).
    pub async fn seed(&self, org: OrganizationId, last_hash: Digest32) {
        let lock = self.lock_for(org);
        let mut guard = lock.lock().await;
        *guard = last_hash;
    }

    pub async fn current(&self, org: OrganizationId) -> Digest32 {
        let lock = self.lock_for(org);
        let guard = lock.lock().await;
        *guard
    }

    /// Links `draft` onto the chain and persists it via `storage`, holding
    /// the per-org lock across both steps so that `last_hash` only advances
    /// after the storage write acknowledges (spec.md §4.3 "Failure
    /// semantics": a write failure before `last_hash` is set leaves the
    /// chain unaffected; the write must ack before the update).
    pub async fn capture(&self, storage: &dyn AuditStorage, draft: AuditEventDraft) -> Result<AuditEvent> {
        let lock = self.lock_for(draft.organization_id);
        let mut guard = lock.lock().await;
        let previous_hash = *guard;
        let hash = compute_hash(&draft, previous_hash);

        let event = AuditEvent {
            event_id: draft.event_id,
            timestamp: draft.timestamp,
            organization_id: draft.organization_id,
            project_id: draft.project_id,
            actor: draft.actor,
            classification: draft.classification,
            resource: draft.resource,
            action: draft.action,
            previous_state: draft.previous_state,
            new_state: draft.new_state,
            request_id: draft.request_id,
            session_id: draft.session_id,
            hash,
            previous_hash,
        };

        storage.write_event(&event).await?;
        *guard = hash;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Actor, ActorType, Classification, EventCategory, Resource, Severity};
    use crate::storage::LocalAuditStorage;
    use agenttrace_core::domain::ids::EventId;
    use chrono::Utc;

    fn draft(org: OrganizationId) -> AuditEventDraft {
        AuditEventDraft {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: org,
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
    async fn first_event_chains_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let chain = ChainState::new();
        let org = OrganizationId::new();
        let event = chain.capture(&storage, draft(org)).await.unwrap();
        assert_eq!(event.previous_hash, Digest32::ZERO);
    }

    #[tokio::test]
    async fn second_event_chains_from_first_hash() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let chain = ChainState::new();
        let org = OrganizationId::new();
        let first = chain.capture(&storage, draft(org)).await.unwrap();
        let second = chain.capture(&storage, draft(org)).await.unwrap();
        assert_eq!(second.previous_hash, first.hash);
        assert_ne!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn separate_organizations_chain_independently() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let chain = ChainState::new();
        let org_a = OrganizationId::new();
        let org_b = OrganizationId::new();
        let a = chain.capture(&storage, draft(org_a)).await.unwrap();
        let b = chain.capture(&storage, draft(org_b)).await.unwrap();
        assert_eq!(a.previous_hash, Digest32::ZERO);
        assert_eq!(b.previous_hash, Digest32::ZERO);
    }
}
