use agenttrace_core::domain::ids::{Digest32, EventId, OrganizationId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Service,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Auth,
    Data,
    Config,
    Admin,
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: EventCategory,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Export,
}

/// spec.md §3 "AuditEvent". `hash`/`previous_hash` are populated by the
/// chain-maintenance step (`AuditChain::capture`), never set by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: EventId,
    #[serde(with = "crate::canonical::rfc3339_z")]
    pub timestamp: DateTime<Utc>,
    pub organization_id: OrganizationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub actor: Actor,
    pub classification: Classification,
    pub resource: Resource,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<Value>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub hash: Digest32,
    pub previous_hash: Digest32,
}

/// Everything the caller supplies before chain linkage is computed.
#[derive(Debug, Clone)]
pub struct AuditEventDraft {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub organization_id: OrganizationId,
    pub project_id: Option<ProjectId>,
    pub actor: Actor,
    pub classification: Classification,
    pub resource: Resource,
    pub action: Action,
    pub previous_state: Option<Value>,
    pub new_state: Option<Value>,
    pub request_id: String,
    pub session_id: Option<String>,
}

impl AuditEventDraft {
    pub fn dedup_key(&self, window_secs: u64) -> String {
        let coarse_ts = if window_secs == 0 {
            self.timestamp.timestamp()
        } else {
            self.timestamp.timestamp() / window_secs as i64
        };
        format!(
            "{}|{}|{}|{}|{:?}|{}",
            self.organization_id,
            self.actor.id,
            self.classification.event_type,
            self.resource.id,
            self.action,
            coarse_ts
        )
    }
}

/// spec.md §3 "Checkpoint". `timestamp_token` is opaque RFC-3161 bytes; EAIC
/// never parses or transports them (TSA transport is an external
/// collaborator per spec.md §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub organization_id: OrganizationId,
    pub date: chrono::NaiveDate,
    pub merkle_root: Digest32,
    pub event_count: u64,
    pub first_event_hash: Digest32,
    pub last_event_hash: Digest32,
    pub previous_checkpoint_hash: Digest32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_token: Option<TimestampToken>,
    pub checkpoint_hash: Digest32,
    /// True when the TSA call failed or was skipped; a retrier upgrades the
    /// checkpoint later (spec.md §4.3 "Failure semantics").
    pub pending_timestamp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampToken {
    pub tsa_identity: String,
    #[serde(with = "base64_bytes")]
    pub token: Vec<u8>,
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// spec.md §3 "MerkleProof".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub event_hash: Digest32,
    pub sibling_hashes: Vec<Digest32>,
    pub directions: Vec<Direction>,
    pub root_hash: Digest32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyChainReport {
    pub total: u64,
    pub valid: bool,
    pub broken_links: Vec<EventId>,
    pub hash_mismatches: Vec<EventId>,
    pub sequence_gaps: Vec<(EventId, EventId)>,
    pub timestamp_skew_violations: Vec<EventId>,
}
