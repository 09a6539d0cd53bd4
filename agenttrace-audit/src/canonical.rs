use agenttrace_core::domain::ids::Digest32;
use serde_json::Value;

use crate::model::{AuditEvent, AuditEventDraft};

/// RFC-3339 with explicit UTC `Z` suffix, matching spec.md §4.3 "Canonical
/// encoding" ("timestamps as RFC-3339 with UTC offset `Z`"). chrono's default
/// `Serialize` impl would emit `+00:00`, so every timestamp field routes
/// through this module instead.
pub mod rfc3339_z {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Deterministic JSON bytes for an event, with `hash` excluded, per spec.md
/// §4.3: "The `hash` field is excluded from the canonical bytes." Relies on
/// `serde_json::Map`'s default `BTreeMap` backing (the `preserve_order`
/// feature is never enabled in this workspace) to guarantee sorted keys, and
/// on `to_string` (not `to_string_pretty`) for "no whitespace".
pub fn canonical_bytes(event: &AuditEvent) -> Vec<u8> {
    let mut value = serde_json::to_value(event).expect("AuditEvent always serializes");
    if let Value::Object(ref mut map) = value {
        map.remove("hash");
    }
    serde_json::to_vec(&value).expect("canonical value always serializes")
}

/// Computes the hash an event at chain position `previous_hash` would get,
/// without allocating the full `AuditEvent` — used by `AuditChain::capture`
/// before the event is finalized, and by `verify_chain` when recomputing.
pub fn compute_hash(draft: &AuditEventDraft, previous_hash: Digest32) -> Digest32 {
    let placeholder = AuditEvent {
        event_id: draft.event_id,
        timestamp: draft.timestamp,
        organization_id: draft.organization_id,
        project_id: draft.project_id,
        actor: draft.actor.clone(),
        classification: draft.classification.clone(),
        resource: draft.resource.clone(),
        action: draft.action,
        previous_state: draft.previous_state.clone(),
        new_state: draft.new_state.clone(),
        request_id: draft.request_id.clone(),
        session_id: draft.session_id.clone(),
        hash: Digest32::ZERO,
        previous_hash,
    };
    let bytes = canonical_bytes(&placeholder);
    Digest32::of_concat(&[&bytes, &previous_hash.0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Actor, ActorType, Classification, EventCategory, Resource, Severity};
    use agenttrace_core::domain::ids::EventId;
    use chrono::Utc;

    fn sample_draft() -> AuditEventDraft {
        AuditEventDraft {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: agenttrace_core::domain::ids::OrganizationId::new(),
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
        }
    }

    #[test]
    fn canonical_bytes_excludes_hash_field() {
        let draft = sample_draft();
        let hash = compute_hash(&draft, Digest32::ZERO);
        let event = AuditEvent {
            event_id: draft.event_id,
            timestamp: draft.timestamp,
            organization_id: draft.organization_id,
            project_id: draft.project_id,
            actor: draft.actor.clone(),
            classification: draft.classification.clone(),
            resource: draft.resource.clone(),
            action: draft.action,
            previous_state: draft.previous_state.clone(),
            new_state: draft.new_state.clone(),
            request_id: draft.request_id.clone(),
            session_id: draft.session_id.clone(),
            hash,
            previous_hash: Digest32::ZERO,
        };
        let bytes = canonical_bytes(&event);
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("\"hash\""));
        assert!(text.contains("previous_hash"));
        assert!(!text.contains(' '));
    }

    #[test]
    fn same_draft_same_previous_hash_is_deterministic() {
        let draft = sample_draft();
        let h1 = compute_hash(&draft, Digest32::ZERO);
        let h2 = compute_hash(&draft, Digest32::ZERO);
        assert_eq!(h1, h2);
    }

    #[test]
    fn timestamp_renders_with_z_suffix() {
        let draft = sample_draft();
        let hash = compute_hash(&draft, Digest32::ZERO);
        let event = AuditEvent {
            event_id: draft.event_id,
            timestamp: draft.timestamp,
            organization_id: draft.organization_id,
            project_id: None,
            actor: draft.actor.clone(),
            classification: draft.classification.clone(),
            resource: draft.resource.clone(),
            action: draft.action,
            previous_state: None,
            new_state: None,
            request_id: draft.request_id.clone(),
            session_id: None,
            hash,
            previous_hash: Digest32::ZERO,
        };
        let text = String::from_utf8(canonical_bytes(&event)).unwrap();
        assert!(text.contains('Z'));
        assert!(!text.contains("+00:00"));
    }
}
