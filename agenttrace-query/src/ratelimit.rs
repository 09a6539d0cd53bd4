use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Which C6 operation a call is being rate-limited against (spec.md §4.6
/// "Rate limiting"): query endpoints 60/min, export 10/min, stream
/// connections 5/min.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Query,
    Export,
    Stream,
}

impl RateLimitScope {
    fn per_minute(self) -> u32 {
        match self {
            RateLimitScope::Query => 60,
            RateLimitScope::Export => 10,
            RateLimitScope::Stream => 5,
        }
    }
}

/// Token bucket refilling continuously at `per_minute/60` tokens per second,
/// capacity equal to the per-minute allowance (adapted from the teacher's
/// `security::rate_limit::TokenBucket`).
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self { tokens: capacity, capacity, refill_rate, last_update: Instant::now() }
    }

    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }
}

/// Per-principal, per-scope token buckets keyed by `(principal, scope)`.
/// Exceeding the bucket returns the `Retry-After` hint named in spec.md
/// §4.6.
pub struct RateLimiter {
    buckets: DashMap<(String, RateLimitScope), TokenBucket>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { buckets: DashMap::new() }
    }

    pub fn check(&self, principal: &str, scope: RateLimitScope) -> Result<(), Duration> {
        let mut bucket = self
            .buckets
            .entry((principal.to_string(), scope))
            .or_insert_with(|| {
                let per_minute = scope.per_minute() as f64;
                TokenBucket::new(per_minute, per_minute / 60.0)
            });
        bucket.try_consume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_recovers_after_refill() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("user-1", RateLimitScope::Stream).is_ok());
        }
        assert!(limiter.check("user-1", RateLimitScope::Stream).is_err());
    }

    #[test]
    fn scopes_and_principals_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.check("user-1", RateLimitScope::Export).is_ok());
        }
        assert!(limiter.check("user-1", RateLimitScope::Export).is_err());
        assert!(limiter.check("user-1", RateLimitScope::Query).is_ok());
        assert!(limiter.check("user-2", RateLimitScope::Export).is_ok());
    }

    #[test]
    fn retry_after_hint_is_positive_when_exhausted() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            let _ = limiter.check("user-1", RateLimitScope::Stream);
        }
        let err = limiter.check("user-1", RateLimitScope::Stream).unwrap_err();
        assert!(err > Duration::ZERO);
    }
}
