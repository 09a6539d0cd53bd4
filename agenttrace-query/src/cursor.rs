use agenttrace_core::domain::ids::EventId;
use agenttrace_core::error::{CoreError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pagination cursor (spec.md §4.6 "Cursor"): `Base64(JSON {last_ts,
/// last_event_id})`. Stateless — any cursor value can be decoded without a
/// server-side lookup, and ordering is always `(timestamp DESC, event_id
/// DESC)` with the next-page predicate `(timestamp, event_id) < (last_ts,
/// last_event_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_ts: DateTime<Utc>,
    pub last_event_id: EventId,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("Cursor always serializes");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(value: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CoreError::Validation(format!("invalid cursor encoding: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::Validation(format!("invalid cursor payload: {e}")))
    }

    /// True if `(ts, event_id)` sorts strictly before this cursor under
    /// `(timestamp DESC, event_id DESC)` ordering — the next-page predicate.
    pub fn is_before(&self, ts: DateTime<Utc>, event_id: EventId) -> bool {
        (ts, event_id.as_uuid()) < (self.last_ts, self.last_event_id.as_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_encode_is_identity() {
        let cursor = Cursor { last_ts: Utc::now(), last_event_id: EventId::new() };
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        assert!(Cursor::decode("not-valid-base64!!").is_err());
    }

    #[test]
    fn ordering_predicate_matches_timestamp_then_event_id() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(1);
        let event_a = EventId::new();
        let cursor = Cursor { last_ts: later, last_event_id: event_a };
        assert!(cursor.is_before(earlier, EventId::new()));
        assert!(!cursor.is_before(later, event_a));
    }
}
