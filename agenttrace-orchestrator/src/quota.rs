use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Per-submitter rolling submission counters (spec.md §4.5 "Quota
/// enforcement"): day window = 24h, week = 7d, min_gap between consecutive
/// accepted submissions = 1h.
pub struct QuotaTracker {
    accepted_at: DashMap<String, Vec<DateTime<Utc>>>,
    day_limit: usize,
    week_limit: usize,
    min_gap: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaViolation {
    DayLimit,
    WeekLimit,
    MinGap,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(5, 20, Duration::from_secs(3600))
    }
}

impl QuotaTracker {
    pub fn new(day_limit: usize, week_limit: usize, min_gap: Duration) -> Self {
        Self { accepted_at: DashMap::new(), day_limit, week_limit, min_gap }
    }

    /// Checks whether `submitter` may submit at `now` without mutating state.
    pub fn check(&self, submitter: &str, now: DateTime<Utc>) -> Result<(), QuotaViolation> {
        let history = self.accepted_at.get(submitter);
        let Some(history) = history else { return Ok(()) };

        if let Some(last) = history.iter().max() {
            if now.signed_duration_since(*last).to_std().unwrap_or(Duration::MAX) < self.min_gap {
                return Err(QuotaViolation::MinGap);
            }
        }

        let day_count = history.iter().filter(|t| now.signed_duration_since(**t) <= chrono::Duration::hours(24)).count();
        if day_count >= self.day_limit {
            return Err(QuotaViolation::DayLimit);
        }

        let week_count = history.iter().filter(|t| now.signed_duration_since(**t) <= chrono::Duration::days(7)).count();
        if week_count >= self.week_limit {
            return Err(QuotaViolation::WeekLimit);
        }

        Ok(())
    }

    /// Records an accepted submission, pruning entries older than the week
    /// window so the history doesn't grow unbounded.
    pub fn record(&self, submitter: &str, now: DateTime<Utc>) {
        let mut history = self.accepted_at.entry(submitter.to_string()).or_default();
        history.retain(|t| now.signed_duration_since(*t) <= chrono::Duration::days(7));
        history.push(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_gap_rejects_rapid_resubmission() {
        let tracker = QuotaTracker::default();
        let t0 = Utc::now();
        tracker.record("alice", t0);
        let violation = tracker.check("alice", t0 + chrono::Duration::minutes(5));
        assert_eq!(violation, Err(QuotaViolation::MinGap));
    }

    #[test]
    fn day_limit_rejects_after_five_in_24h() {
        let tracker = QuotaTracker::default();
        let t0 = Utc::now();
        for i in 0..5 {
            tracker.record("alice", t0 + chrono::Duration::hours(i));
        }
        let violation = tracker.check("alice", t0 + chrono::Duration::hours(4) + chrono::Duration::minutes(30));
        assert_eq!(violation, Err(QuotaViolation::DayLimit));
    }

    #[test]
    fn distinct_submitters_have_independent_quotas() {
        let tracker = QuotaTracker::default();
        let t0 = Utc::now();
        tracker.record("alice", t0);
        assert!(tracker.check("bob", t0).is_ok());
    }
}
