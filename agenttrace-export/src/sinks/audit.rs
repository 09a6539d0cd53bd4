use std::sync::Arc;

use agenttrace_audit::{Action, Actor, ActorType, AuditEventDraft, AuditLog, Classification, EventCategory, Resource, Severity};
use agenttrace_core::domain::ids::EventId;
use agenttrace_core::domain::span::{Span, SpanKind, SpanStatus};
use agenttrace_core::traits::{Sink, SinkOutcome};
use async_trait::async_trait;
use tracing::warn;

/// Predicate deciding whether a span is security-sensitive and must be
/// forwarded to the audit log (spec.md §4.2: "Audit (filtered to
/// security-sensitive spans, forwarded to C3)"). The spec does not name an
/// exact filter, so this defaults to: any span that ended in error, plus
/// tool calls against a configurable sensitive-tool allowlist.
pub struct SensitivityFilter {
    pub sensitive_tools: Vec<String>,
}

impl Default for SensitivityFilter {
    fn default() -> Self {
        Self {
            sensitive_tools: vec![
                "shell".to_string(),
                "file_write".to_string(),
                "http_request".to_string(),
                "secrets_read".to_string(),
            ],
        }
    }
}

impl SensitivityFilter {
    pub fn is_sensitive(&self, span: &Span) -> bool {
        if span.status == SpanStatus::Error {
            return true;
        }
        if span.kind == SpanKind::ToolCall {
            if let Some(tool) = span.attributes.get("tool.name").and_then(|v| v.as_str()) {
                return self.sensitive_tools.iter().any(|t| t == tool);
            }
        }
        false
    }
}

/// Forwards security-sensitive spans into the audit log as `AuditEvent`s
/// (spec.md §4.2). The underlying `AuditLog` already performs chaining,
/// dedup, and WORM persistence; this sink only maps `Span` to
/// `AuditEventDraft` and filters.
pub struct AuditSink {
    log: Arc<AuditLog>,
    filter: SensitivityFilter,
    organization_id: agenttrace_core::domain::ids::OrganizationId,
}

impl AuditSink {
    pub fn new(log: Arc<AuditLog>, organization_id: agenttrace_core::domain::ids::OrganizationId) -> Self {
        Self { log, filter: SensitivityFilter::default(), organization_id }
    }

    fn draft_for(&self, span: &Span) -> AuditEventDraft {
        let severity = if span.status == SpanStatus::Error { Severity::Critical } else { Severity::Warning };
        AuditEventDraft {
            event_id: EventId::new(),
            timestamp: span.start_ts,
            organization_id: self.organization_id,
            project_id: None,
            actor: Actor {
                actor_type: ActorType::Service,
                id: span.trace_id.to_string(),
                email: None,
                ip: None,
                user_agent: None,
            },
            classification: Classification {
                category: EventCategory::Data,
                event_type: format!("span.{:?}", span.kind).to_lowercase(),
                severity,
            },
            resource: Resource {
                resource_type: "span".to_string(),
                id: span.span_id.to_string(),
                name: Some(span.name.clone()),
            },
            action: Action::Create,
            previous_state: None,
            new_state: span.output.clone(),
            request_id: span.trace_id.to_string(),
            session_id: None,
        }
    }
}

#[async_trait]
impl Sink for AuditSink {
    fn name(&self) -> &str {
        "audit"
    }

    async fn export(&self, batch: &[Span]) -> SinkOutcome {
        let mut failures = 0usize;
        let mut sensitive = 0usize;
        for span in batch.iter().filter(|s| self.filter.is_sensitive(s)) {
            sensitive += 1;
            let draft = self.draft_for(span);
            if let Err(e) = self.log.capture_event(draft).await {
                if e.kind() != "validation_error" {
                    warn!(error = %e, span_id = %span.span_id, "audit sink capture failed");
                    failures += 1;
                }
            }
        }
        if sensitive == 0 || failures == 0 {
            SinkOutcome::Success
        } else {
            SinkOutcome::TransientFailure(format!("{failures}/{sensitive} audit captures failed"))
        }
    }
}
