use agenttrace_core::domain::ids::{EventId, OrganizationId};
use agenttrace_core::error::{CoreError, Result};
use chrono::NaiveDate;
use serde::Serialize;

use agenttrace_audit::verify::verify_chain;
use agenttrace_audit::{AuditEvent, AuditStorage, VerifyChainReport};

#[derive(Debug, Clone, Serialize)]
pub struct EventContext {
    pub event: AuditEvent,
    pub before: Vec<AuditEvent>,
    pub after: Vec<AuditEvent>,
    pub chain_verification: ChainVerificationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainVerificationSummary {
    pub valid: bool,
    pub total: u64,
}

impl From<VerifyChainReport> for ChainVerificationSummary {
    fn from(report: VerifyChainReport) -> Self {
        Self { valid: report.valid, total: report.total }
    }
}

/// `get_with_context(event_id, before, after)` (spec.md §4.6 "Event
/// context"): the event plus up to `before`/`after` neighbors in the same
/// (org, day) chain, with a chain verification status for that day's window.
pub async fn get_with_context(
    storage: &dyn AuditStorage,
    org: OrganizationId,
    date: NaiveDate,
    event_id: EventId,
    before: usize,
    after: usize,
) -> Result<EventContext> {
    let mut day_events = storage.list_events(org, date).await?;
    day_events.sort_by_key(|e| e.timestamp);

    let index = day_events
        .iter()
        .position(|e| e.event_id == event_id)
        .ok_or_else(|| CoreError::NotFound(format!("event {event_id} not found on {date}")))?;

    let before_start = index.saturating_sub(before);
    let after_end = (index + 1 + after).min(day_events.len());

    let before_events = day_events[before_start..index].to_vec();
    let event = day_events[index].clone();
    let after_events = day_events[index + 1..after_end].to_vec();

    let report = verify_chain(storage, org, date, date, 300).await?;

    Ok(EventContext { event, before: before_events, after: after_events, chain_verification: report.into() })
}
