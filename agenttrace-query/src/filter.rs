use agenttrace_core::domain::ids::OrganizationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agenttrace_audit::{Action, ActorType, EventCategory, Severity};

use crate::cursor::Cursor;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// `query_events(filter)` (spec.md §4.6 "Query"). `organization_id` and the
/// time range are required; every other field narrows the result further.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub organization_id: OrganizationId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub actor_type: Option<ActorType>,
    pub event_category: Option<EventCategory>,
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<Action>,
    pub severity: Option<Severity>,
    pub limit: usize,
    pub cursor: Option<Cursor>,
}

impl EventFilter {
    pub fn new(organization_id: OrganizationId, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            organization_id,
            from,
            to,
            actor_id: None,
            actor_type: None,
            event_category: None,
            event_type: None,
            resource_type: None,
            resource_id: None,
            action: None,
            severity: None,
            limit: DEFAULT_LIMIT,
            cursor: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Names of the filter fields actually constraining the result, for
    /// `query_metadata.filters_applied`.
    pub fn filters_applied(&self) -> Vec<String> {
        let mut names = vec!["organization_id".to_string(), "time_range".to_string()];
        if self.actor_id.is_some() {
            names.push("actor_id".to_string());
        }
        if self.actor_type.is_some() {
            names.push("actor_type".to_string());
        }
        if self.event_category.is_some() {
            names.push("event_category".to_string());
        }
        if self.event_type.is_some() {
            names.push("event_type".to_string());
        }
        if self.resource_type.is_some() {
            names.push("resource_type".to_string());
        }
        if self.resource_id.is_some() {
            names.push("resource_id".to_string());
        }
        if self.action.is_some() {
            names.push("action".to_string());
        }
        if self.severity.is_some() {
            names.push("severity".to_string());
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub time_range_ms: i64,
    pub filters_applied: Vec<String>,
}
