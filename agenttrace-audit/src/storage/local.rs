use std::path::PathBuf;

use agenttrace_core::domain::ids::{EventId, OrganizationId};
use agenttrace_core::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::model::{AuditEvent, Checkpoint};

use super::AuditStorage;

/// Local WORM backend: `<root>/<org_id>/<yyyy>/<mm>/<dd>/<event_id>.json`,
/// created with no-overwrite semantics and made read-only (0444 on unix)
/// immediately after write (spec.md §4.3 "v1 Local", §6 "Persisted state
/// layout"). Modeled on the teacher's `FileAuditWriter`, generalized from
/// append-only rotation to one-file-per-event WORM writes.
#[derive(Debug)]
pub struct LocalAuditStorage {
    root: PathBuf,
}

impl LocalAuditStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn event_dir(&self, org: OrganizationId, date: NaiveDate) -> PathBuf {
        self.root
            .join(org.to_string())
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    fn checkpoint_path(&self, org: OrganizationId, date: NaiveDate) -> PathBuf {
        self.root
            .join(org.to_string())
            .join("checkpoints")
            .join(format!("{date}.json"))
    }

    async fn write_worm(&self, path: &std::path::Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    CoreError::Integrity(format!("{} already exists: write-once violation", path.display()))
                }
                _ => CoreError::Storage(e.to_string()),
            })?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        set_read_only(path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn set_read_only(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = tokio::fs::metadata(path).await?;
    let mut perms = metadata.permissions();
    perms.set_mode(0o444);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_read_only(path: &std::path::Path) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    let mut perms = metadata.permissions();
    perms.set_readonly(true);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[async_trait]
impl AuditStorage for LocalAuditStorage {
    async fn write_event(&self, event: &AuditEvent) -> Result<()> {
        let dir = self.event_dir(event.organization_id, event.timestamp.date_naive());
        let path = dir.join(format!("{}.json", event.event_id));
        let bytes = serde_json::to_vec(event)?;
        self.write_worm(&path, &bytes).await
    }

    async fn read_event(&self, org: OrganizationId, date: NaiveDate, event_id: EventId) -> Result<Option<AuditEvent>> {
        let path = self.event_dir(org, date).join(format!("{event_id}.json"));
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }

    async fn list_events(&self, org: OrganizationId, date: NaiveDate) -> Result<Vec<AuditEvent>> {
        let dir = self.event_dir(org, date);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Storage(e.to_string())),
        };

        let mut events = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::Storage(e.to_string()))? {
            let bytes = fs::read(entry.path()).await?;
            events.push(serde_json::from_slice(&bytes)?);
        }
        events.sort_by(|a: &AuditEvent, b: &AuditEvent| {
            a.timestamp.cmp(&b.timestamp).then(a.event_id.0.cmp(&b.event_id.0))
        });
        Ok(events)
    }

    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.checkpoint_path(checkpoint.organization_id, checkpoint.date);
        let bytes = serde_json::to_vec(checkpoint)?;
        self.write_worm(&path, &bytes).await
    }

    async fn read_checkpoint(&self, org: OrganizationId, date: NaiveDate) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(org, date);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Actor, ActorType, Classification, EventCategory, Resource, Severity};
    use agenttrace_core::domain::ids::Digest32;
    use chrono::Utc;

    fn sample_event() -> AuditEvent {
        AuditEvent {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: OrganizationId::new(),
            project_id: None,
            actor: Actor {
                actor_type: ActorType::User,
                id: "u1".into(),
                email: None,
                ip: None,
                user_agent: None,
            },
            classification: Classification {
                category: EventCategory::Auth,
                event_type: "user.login".into(),
                severity: Severity::Info,
            },
            resource: Resource {
                resource_type: "session".into(),
                id: "s1".into(),
                name: None,
            },
            action: Action::Create,
            previous_state: None,
            new_state: None,
            request_id: "r1".into(),
            session_id: None,
            hash: Digest32::of(b"h"),
            previous_hash: Digest32::ZERO,
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let event = sample_event();
        storage.write_event(&event).await.unwrap();

        let fetched = storage
            .read_event(event.organization_id, event.timestamp.date_naive(), event.event_id)
            .await
            .unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn second_write_to_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let event = sample_event();
        storage.write_event(&event).await.unwrap();
        let result = storage.write_event(&event).await;
        assert!(result.is_err());
    }
}
