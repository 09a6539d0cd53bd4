use agenttrace_core::domain::ids::{EventId, OrganizationId};
use agenttrace_core::error::Result;
use chrono::Utc;

use agenttrace_audit::{Action, Actor, ActorType, AuditEventDraft, AuditLog, Classification, EventCategory, Resource, Severity};

/// `event_type ∈ {audit_log.viewed, audit_log.exported}` (spec.md §4.6:
/// "Every C6 call is itself audited"). `record_access` is called once per
/// query/export/stream operation that actually returns data to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C6Operation {
    Viewed,
    Exported,
}

impl C6Operation {
    fn event_type(self) -> &'static str {
        match self {
            C6Operation::Viewed => "audit_log.viewed",
            C6Operation::Exported => "audit_log.exported",
        }
    }
}

pub async fn record_access(
    audit_log: &AuditLog,
    org: OrganizationId,
    actor_id: &str,
    operation: C6Operation,
    resource_id: &str,
) -> Result<()> {
    let draft = AuditEventDraft {
        event_id: EventId::new(),
        timestamp: Utc::now(),
        organization_id: org,
        project_id: None,
        actor: Actor { actor_type: ActorType::Service, id: actor_id.to_string(), email: None, ip: None, user_agent: None },
        classification: Classification {
            category: EventCategory::Admin,
            event_type: operation.event_type().to_string(),
            severity: Severity::Info,
        },
        resource: Resource { resource_type: "audit_log".to_string(), id: resource_id.to_string(), name: None },
        action: Action::Read,
        previous_state: None,
        new_state: None,
        request_id: EventId::new().to_string(),
        session_id: None,
    };
    audit_log.capture_event(draft).await.map(|_| ())
}
