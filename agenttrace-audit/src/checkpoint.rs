use agenttrace_core::domain::ids::{Digest32, OrganizationId};
use agenttrace_core::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::merkle::MerkleTree;
use crate::model::{AuditEvent, Checkpoint, TimestampToken};
use crate::storage::AuditStorage;

/// TSA transport is an external collaborator (spec.md §1 "Out of scope");
/// EAIC only needs an opaque token over a digest. Implementations call out
/// to an RFC-3161 timestamp authority and hand back its response bytes
/// untouched.
#[async_trait]
pub trait Timestamper: Send + Sync {
    async fn timestamp(&self, digest: Digest32) -> Result<TimestampToken>;
}

/// Always fails; used when no TSA is configured so checkpoints are produced
/// with `pending_timestamp = true` rather than blocking.
pub struct NoTimestamper;

#[async_trait]
impl Timestamper for NoTimestamper {
    async fn timestamp(&self, _digest: Digest32) -> Result<TimestampToken> {
        Err(agenttrace_core::error::CoreError::Internal("no TSA configured".into()))
    }
}

fn checkpoint_hash(checkpoint: &Checkpoint) -> Digest32 {
    let mut value = serde_json::to_value(checkpoint).expect("Checkpoint always serializes");
    if let serde_json::Value::Object(ref mut map) = value {
        map.remove("checkpoint_hash");
    }
    let bytes = serde_json::to_vec(&value).expect("canonical value always serializes");
    Digest32::of(&bytes)
}

/// Builds and persists the checkpoint for `(org, date)` (spec.md §4.3
/// "Checkpoints"). Fetches the day's events from `storage`, builds the
/// Merkle root over them ordered `(timestamp, event_id)`, obtains a TSA
/// token over `H(merkle_root || org || date)`, chains to the previous day's
/// `checkpoint_hash`, and persists.
pub async fn create_checkpoint(
    storage: &dyn AuditStorage,
    timestamper: &dyn Timestamper,
    org: OrganizationId,
    date: NaiveDate,
) -> Result<Checkpoint> {
    let events = storage.list_events(org, date).await?;
    let leaves: Vec<Digest32> = events.iter().map(|e| e.hash).collect();
    let tree = MerkleTree::build(leaves);
    let merkle_root = tree.root();

    let first_event_hash = events.first().map(|e: &AuditEvent| e.hash).unwrap_or(Digest32::ZERO);
    let last_event_hash = events.last().map(|e: &AuditEvent| e.hash).unwrap_or(Digest32::ZERO);

    let previous_checkpoint_hash = match date.pred_opt() {
        Some(prev_date) => storage
            .read_checkpoint(org, prev_date)
            .await?
            .map(|c| c.checkpoint_hash)
            .unwrap_or(Digest32::ZERO),
        None => Digest32::ZERO,
    };

    let digest_for_tsa = Digest32::of_concat(&[
        &merkle_root.0,
        org.as_uuid().as_bytes(),
        date.to_string().as_bytes(),
    ]);

    let (timestamp_token, pending_timestamp) = match timestamper.timestamp(digest_for_tsa).await {
        Ok(token) => (Some(token), false),
        Err(_) => (None, true),
    };

    let mut checkpoint = Checkpoint {
        organization_id: org,
        date,
        merkle_root,
        event_count: events.len() as u64,
        first_event_hash,
        last_event_hash,
        previous_checkpoint_hash,
        timestamp_token,
        checkpoint_hash: Digest32::ZERO,
        pending_timestamp,
    };
    checkpoint.checkpoint_hash = checkpoint_hash(&checkpoint);

    storage.write_checkpoint(&checkpoint).await?;
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalAuditStorage;

    struct FailingTimestamper;

    #[async_trait]
    impl Timestamper for FailingTimestamper {
        async fn timestamp(&self, _digest: Digest32) -> Result<TimestampToken> {
            Err(agenttrace_core::error::CoreError::Internal("tsa down".into()))
        }
    }

    #[tokio::test]
    async fn checkpoint_with_no_events_is_empty_but_valid() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let checkpoint = create_checkpoint(&storage, &NoTimestamper, org, date).await.unwrap();
        assert_eq!(checkpoint.event_count, 0);
        assert_eq!(checkpoint.merkle_root, Digest32::ZERO);
        assert!(checkpoint.pending_timestamp);
    }

    #[tokio::test]
    async fn tsa_failure_marks_pending_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let checkpoint = create_checkpoint(&storage, &FailingTimestamper, org, date).await.unwrap();
        assert!(checkpoint.pending_timestamp);
        assert!(checkpoint.timestamp_token.is_none());
    }
}
