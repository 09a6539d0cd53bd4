use agenttrace_core::error::Result;
use serde::Serialize;

use agenttrace_audit::{AuditEvent, AuditStorage};

use crate::cursor::Cursor;
use crate::filter::{EventFilter, QueryMetadata};

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub events: Vec<AuditEvent>,
    pub next_cursor: Option<String>,
    pub query_metadata: QueryMetadata,
}

/// `query_events(filter)` (spec.md §4.6). Lists every day in `[from, to]`,
/// filters in memory, sorts `(timestamp DESC, event_id DESC)`, applies the
/// cursor predicate, and returns at most `filter.limit` events plus the
/// cursor for the next page.
pub async fn query_events(storage: &dyn AuditStorage, filter: &EventFilter) -> Result<QueryResult> {
    let mut events = Vec::new();
    let mut date = filter.from.date_naive();
    let to_date = filter.to.date_naive();

    while date <= to_date {
        let mut day_events = storage.list_events(filter.organization_id, date).await?;
        day_events.retain(|e| matches(e, filter));
        events.extend(day_events);
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    events.sort_by(|a, b| (b.timestamp, b.event_id.as_uuid()).cmp(&(a.timestamp, a.event_id.as_uuid())));

    if let Some(cursor) = &filter.cursor {
        events.retain(|e| cursor.is_before(e.timestamp, e.event_id));
    }

    let has_more = events.len() > filter.limit;
    events.truncate(filter.limit);

    let next_cursor = if has_more {
        events.last().map(|e| Cursor { last_ts: e.timestamp, last_event_id: e.event_id }.encode())
    } else {
        None
    };

    Ok(QueryResult {
        events,
        next_cursor,
        query_metadata: QueryMetadata {
            time_range_ms: (filter.to - filter.from).num_milliseconds(),
            filters_applied: filter.filters_applied(),
        },
    })
}

fn matches(event: &AuditEvent, filter: &EventFilter) -> bool {
    if event.timestamp < filter.from || event.timestamp > filter.to {
        return false;
    }
    if let Some(actor_id) = &filter.actor_id {
        if &event.actor.id != actor_id {
            return false;
        }
    }
    if let Some(actor_type) = filter.actor_type {
        if event.actor.actor_type != actor_type {
            return false;
        }
    }
    if let Some(category) = filter.event_category {
        if event.classification.category != category {
            return false;
        }
    }
    if let Some(event_type) = &filter.event_type {
        if &event.classification.event_type != event_type {
            return false;
        }
    }
    if let Some(resource_type) = &filter.resource_type {
        if &event.resource.resource_type != resource_type {
            return false;
        }
    }
    if let Some(resource_id) = &filter.resource_id {
        if &event.resource.id != resource_id {
            return false;
        }
    }
    if let Some(action) = filter.action {
        if event.action != action {
            return false;
        }
    }
    if let Some(severity) = filter.severity {
        if event.classification.severity != severity {
            return false;
        }
    }
    true
}
