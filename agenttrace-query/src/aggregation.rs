use std::collections::HashMap;

use agenttrace_core::domain::ids::OrganizationId;
use agenttrace_core::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;

use agenttrace_audit::{Action, AuditEvent, AuditStorage, EventCategory, Severity};

const TOP_N: usize = 10;
pub const DEFAULT_CRITICAL_BURST_THRESHOLD: u64 = 10;
pub const DEFAULT_ACTOR_ACTIVITY_MAX_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct DaySpike {
    pub date: NaiveDate,
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorAnomaly {
    pub actor_id: String,
    pub share: f64,
    pub historical_mean_share: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticalBurst {
    pub date: NaiveDate,
    pub count: u64,
    pub threshold: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Anomalies {
    pub day_spikes: Vec<DaySpike>,
    pub actor_anomalies: Vec<ActorAnomaly>,
    pub critical_bursts: Vec<CriticalBurst>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: u64,
    pub counts_by_category: HashMap<String, u64>,
    pub counts_by_day: HashMap<NaiveDate, u64>,
    pub top_actors: Vec<(String, u64)>,
    pub top_resources: Vec<(String, u64)>,
    pub anomalies: Anomalies,
}

/// `summary(org, range)` (spec.md §4.6 "Aggregation").
pub async fn summary(
    storage: &dyn AuditStorage,
    org: OrganizationId,
    from: NaiveDate,
    to: NaiveDate,
    critical_burst_threshold: u64,
) -> Result<Summary> {
    let mut counts_by_category: HashMap<String, u64> = HashMap::new();
    let mut counts_by_day: HashMap<NaiveDate, u64> = HashMap::new();
    let mut counts_by_actor: HashMap<String, u64> = HashMap::new();
    let mut counts_by_resource: HashMap<String, u64> = HashMap::new();
    let mut critical_by_day: HashMap<NaiveDate, u64> = HashMap::new();
    let mut total = 0u64;

    let mut date = from;
    while date <= to {
        let events = storage.list_events(org, date).await?;
        total += events.len() as u64;
        *counts_by_day.entry(date).or_insert(0) += events.len() as u64;
        for event in &events {
            *counts_by_category.entry(category_key(event.classification.category)).or_insert(0) += 1;
            *counts_by_actor.entry(event.actor.id.clone()).or_insert(0) += 1;
            *counts_by_resource.entry(event.resource.id.clone()).or_insert(0) += 1;
            if event.classification.severity == Severity::Critical {
                *critical_by_day.entry(date).or_insert(0) += 1;
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    let day_spikes = detect_day_spikes(&counts_by_day);
    let actor_anomalies = detect_actor_anomalies(&counts_by_actor, total);
    let critical_bursts = critical_by_day
        .into_iter()
        .filter(|(_, count)| *count > critical_burst_threshold)
        .map(|(date, count)| CriticalBurst { date, count, threshold: critical_burst_threshold })
        .collect();

    Ok(Summary {
        total,
        counts_by_category,
        counts_by_day,
        top_actors: top_n(&counts_by_actor),
        top_resources: top_n(&counts_by_resource),
        anomalies: Anomalies { day_spikes, actor_anomalies, critical_bursts },
    })
}

fn category_key(category: EventCategory) -> String {
    format!("{category:?}").to_lowercase()
}

fn top_n(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(TOP_N);
    entries
}

/// Day-level spikes: count > mean+3σ over the window (spec.md §4.6 anomaly
/// (a)). Needs at least 2 days of data to define a standard deviation.
fn detect_day_spikes(counts_by_day: &HashMap<NaiveDate, u64>) -> Vec<DaySpike> {
    if counts_by_day.len() < 2 {
        return Vec::new();
    }
    let values: Vec<f64> = counts_by_day.values().map(|v| *v as f64).collect();
    let mean = values[..].mean();
    let std_dev = values[..].std_dev();
    if std_dev == 0.0 {
        return Vec::new();
    }
    let threshold = mean + 3.0 * std_dev;
    counts_by_day
        .iter()
        .filter(|(_, count)| **count as f64 > threshold)
        .map(|(date, count)| DaySpike { date: *date, count: *count, mean, std_dev })
        .collect()
}

/// Actor anomalies: an actor's share of total events exceeds mean+2σ relative
/// to the distribution of shares across all actors (spec.md §4.6 anomaly
/// (b)).
fn detect_actor_anomalies(counts_by_actor: &HashMap<String, u64>, total: u64) -> Vec<ActorAnomaly> {
    if total == 0 || counts_by_actor.len() < 2 {
        return Vec::new();
    }
    let shares: Vec<f64> = counts_by_actor.values().map(|c| *c as f64 / total as f64).collect();
    let mean = shares[..].mean();
    let std_dev = shares[..].std_dev();
    if std_dev == 0.0 {
        return Vec::new();
    }
    let threshold = mean + 2.0 * std_dev;
    counts_by_actor
        .iter()
        .filter_map(|(actor_id, count)| {
            let share = *count as f64 / total as f64;
            (share > threshold).then(|| ActorAnomaly {
                actor_id: actor_id.clone(),
                share,
                historical_mean_share: mean,
                std_dev,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorActivity {
    pub actor_id: String,
    pub counts_by_category: HashMap<String, u64>,
    pub counts_by_action: HashMap<String, u64>,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub top_resources: Vec<(String, u64)>,
    pub timeline_by_day: HashMap<NaiveDate, u64>,
    pub events: Vec<AuditEvent>,
}

/// `actor_activity(actor_id, range, limit)` (spec.md §4.6 "Actor activity").
/// `limit` is clamped to `DEFAULT_ACTOR_ACTIVITY_MAX_LIMIT` (10,000).
pub async fn actor_activity(
    storage: &dyn AuditStorage,
    org: OrganizationId,
    actor_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    limit: usize,
) -> Result<ActorActivity> {
    let limit = limit.min(DEFAULT_ACTOR_ACTIVITY_MAX_LIMIT);
    let mut events = Vec::new();
    let mut date = from;
    while date <= to {
        let mut day_events = storage.list_events(org, date).await?;
        day_events.retain(|e| e.actor.id == actor_id);
        events.extend(day_events);
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    events.sort_by_key(|e| e.timestamp);

    let mut counts_by_category: HashMap<String, u64> = HashMap::new();
    let mut counts_by_action: HashMap<String, u64> = HashMap::new();
    let mut counts_by_resource: HashMap<String, u64> = HashMap::new();
    let mut timeline_by_day: HashMap<NaiveDate, u64> = HashMap::new();

    for event in &events {
        *counts_by_category.entry(category_key(event.classification.category)).or_insert(0) += 1;
        *counts_by_action.entry(action_key(event.action)).or_insert(0) += 1;
        *counts_by_resource.entry(event.resource.id.clone()).or_insert(0) += 1;
        *timeline_by_day.entry(event.timestamp.date_naive()).or_insert(0) += 1;
    }

    let first_event_at = events.first().map(|e| e.timestamp);
    let last_event_at = events.last().map(|e| e.timestamp);
    let top_resources = top_n(&counts_by_resource);
    events.truncate(limit);

    Ok(ActorActivity {
        actor_id: actor_id.to_string(),
        counts_by_category,
        counts_by_action,
        first_event_at,
        last_event_at,
        top_resources,
        timeline_by_day,
        events,
    })
}

fn action_key(action: Action) -> String {
    format!("{action:?}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_audit::chain::ChainState;
    use agenttrace_audit::storage::LocalAuditStorage;
    use agenttrace_audit::{Actor, ActorType, AuditEventDraft, Classification, Resource};
    use agenttrace_core::domain::ids::EventId;

    fn draft(org: OrganizationId, actor_id: &str, severity: Severity) -> AuditEventDraft {
        AuditEventDraft {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            organization_id: org,
            project_id: None,
            actor: Actor { actor_type: ActorType::User, id: actor_id.into(), email: None, ip: None, user_agent: None },
            classification: Classification { category: EventCategory::Auth, event_type: "evt".into(), severity },
            resource: Resource { resource_type: "session".into(), id: "s1".into(), name: None },
            action: Action::Create,
            previous_state: None,
            new_state: None,
            request_id: "r1".into(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn summary_counts_and_flags_critical_bursts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let chain = ChainState::new();
        let org = OrganizationId::new();
        let today = Utc::now().date_naive();

        for _ in 0..12 {
            chain.capture(&storage, draft(org, "u1", Severity::Critical)).await.unwrap();
        }

        let result = summary(&storage, org, today, today, DEFAULT_CRITICAL_BURST_THRESHOLD).await.unwrap();
        assert_eq!(result.total, 12);
        assert_eq!(result.anomalies.critical_bursts.len(), 1);
        assert_eq!(result.anomalies.critical_bursts[0].count, 12);
    }

    #[tokio::test]
    async fn actor_activity_collects_per_actor_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalAuditStorage::new(dir.path());
        let chain = ChainState::new();
        let org = OrganizationId::new();
        let today = Utc::now().date_naive();

        for _ in 0..3 {
            chain.capture(&storage, draft(org, "u1", Severity::Info)).await.unwrap();
        }
        chain.capture(&storage, draft(org, "u2", Severity::Info)).await.unwrap();

        let activity = actor_activity(&storage, org, "u1", today, today, 100).await.unwrap();
        assert_eq!(activity.events.len(), 3);
        assert!(activity.first_event_at.is_some());
        assert_eq!(*activity.timeline_by_day.get(&today).unwrap(), 3);
    }
}
