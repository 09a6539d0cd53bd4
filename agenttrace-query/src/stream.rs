use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use agenttrace_audit::AuditEvent;

const SUBSCRIBER_BUFFER_LIMIT: usize = 10_000;

/// Live audit event bus (spec.md §4.6 "Live stream"): best-effort fan-out
/// after chain commit; subscribers whose buffer exceeds 10,000 events are
/// disconnected rather than allowed to back-pressure the publisher. Modeled
/// on the export pipeline's bounded-queue drop policy, but per-subscriber
/// and disconnect-on-overflow instead of drop-oldest, since a stream
/// subscriber that falls behind has already missed its window for acting on
/// stale events.
pub struct EventStream {
    subscribers: DashMap<Uuid, mpsc::Sender<AuditEvent>>,
}

pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<AuditEvent>,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new() }
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_LIMIT);
        self.subscribers.insert(id, tx);
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publishes `event` to every subscriber; a subscriber whose channel is
    /// full (buffer exceeded) is dropped rather than blocked on.
    pub fn publish(&self, event: &AuditEvent) {
        let mut to_drop = Vec::new();
        for entry in self.subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = entry.value().try_send(event.clone()) {
                to_drop.push(*entry.key());
            } else if entry.value().is_closed() {
                to_drop.push(*entry.key());
            }
        }
        for id in to_drop {
            warn!(subscriber_id = %id, "stream subscriber buffer exceeded; disconnecting");
            self.subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_audit::{Action, Actor, ActorType, Classification, EventCategory, Resource, Severity};
    use agenttrace_core::domain::ids::{Digest32, EventId, OrganizationId};
    use chrono::Utc;

    fn event() -> AuditEvent {
        AuditEvent {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: OrganizationId::new(),
            project_id: None,
            actor: Actor { actor_type: ActorType::User, id: "u1".into(), email: None, ip: None, user_agent: None },
            classification: Classification { category: EventCategory::Auth, event_type: "evt".into(), severity: Severity::Info },
            resource: Resource { resource_type: "session".into(), id: "s1".into(), name: None },
            action: Action::Create,
            previous_state: None,
            new_state: None,
            request_id: "r1".into(),
            session_id: None,
            hash: Digest32::ZERO,
            previous_hash: Digest32::ZERO,
        }
    }

    #[tokio::test]
    async fn published_events_reach_every_subscriber() {
        let stream = Arc::new(EventStream::new());
        let mut sub1 = stream.subscribe();
        let mut sub2 = stream.subscribe();

        stream.publish(&event());

        assert!(sub1.receiver.recv().await.is_some());
        assert!(sub2.receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let stream = Arc::new(EventStream::new());
        let sub = stream.subscribe();
        stream.unsubscribe(sub.id);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_disconnected() {
        let stream = Arc::new(EventStream::new());
        let sub = stream.subscribe();
        for _ in 0..SUBSCRIBER_BUFFER_LIMIT {
            stream.publish(&event());
        }
        assert_eq!(stream.subscriber_count(), 1);
        stream.publish(&event());
        assert_eq!(stream.subscriber_count(), 0);
        drop(sub);
    }
}
