use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter, matching spec.md §4.2: base 1s, factor 2,
/// max 30s, jitter ±25%, up to `max_retries` attempts after the first try.
/// Generalizes the `1 << attempt` backoff shape already used by the
/// teacher's workflow engine for step retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    pub jitter: f64,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: 0.25,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (0-indexed: the first retry is
    /// attempt 0). Jitter is applied as a uniform multiplier in
    /// `[1-jitter, 1+jitter]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = exp.min(self.max.as_secs_f64());
        let jitter_factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt_but_caps_at_max() {
        let policy = BackoffPolicy::default();
        let d0 = policy.delay(0).as_secs_f64();
        let d5 = policy.delay(5).as_secs_f64();
        assert!(d0 <= 1.25 && d0 >= 0.75);
        assert!(d5 <= policy.max.as_secs_f64() * 1.25 + 0.001);
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = BackoffPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
