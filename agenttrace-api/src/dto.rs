use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use agenttrace_audit::{Action, ActorType, EventCategory, Severity};
use agenttrace_query::ExportFormat;

fn default_before() -> usize {
    5
}

fn default_after() -> usize {
    5
}

/// Query parameters for `GET /v1/audit/events` (spec.md §6, §4.6).
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
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
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// `date` scopes the single-day storage lookup for an individual event
/// (spec.md's WORM layout is `<org>/<yyyy>/<mm>/<dd>/<event_id>.json`, so a
/// lookup by id alone cannot locate the day without this hint).
#[derive(Debug, Deserialize)]
pub struct EventLookupQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct EventContextQuery {
    pub date: NaiveDate,
    #[serde(default = "default_before")]
    pub before: usize,
    #[serde(default = "default_after")]
    pub after: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub critical_burst_threshold: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ActorActivityQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub max_clock_skew_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequestBody {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub format: ExportFormat,
    #[serde(default)]
    pub include_verification: bool,
    pub encryption_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MerkleProofRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct MerkleProofVerifyRequest {
    pub proof: agenttrace_audit::MerkleProof,
    pub root_hash: agenttrace_core::domain::ids::Digest32,
}
