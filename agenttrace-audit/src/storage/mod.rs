pub mod local;
pub mod object_store;

use agenttrace_core::domain::ids::{EventId, OrganizationId};
use agenttrace_core::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{AuditEvent, Checkpoint};

/// Narrow write-once storage capability (spec.md §9: "AuditStorage:
/// write/read/query/verify"). `write` must fail if the object already
/// exists — overwrite is never permitted once an event or checkpoint has
/// been persisted.
#[async_trait]
pub trait AuditStorage: Send + Sync + std::fmt::Debug {
    async fn write_event(&self, event: &AuditEvent) -> Result<()>;
    async fn read_event(&self, org: OrganizationId, date: NaiveDate, event_id: EventId) -> Result<Option<AuditEvent>>;
    async fn list_events(&self, org: OrganizationId, date: NaiveDate) -> Result<Vec<AuditEvent>>;
    async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn read_checkpoint(&self, org: OrganizationId, date: NaiveDate) -> Result<Option<Checkpoint>>;
}

pub use local::LocalAuditStorage;
pub use object_store::ObjectStoreAuditStorage;
