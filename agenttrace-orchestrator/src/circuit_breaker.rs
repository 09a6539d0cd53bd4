use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// spec.md §4.5 "Circuit breaker (per endpoint)": closed/open/half_open with
/// `failure_threshold=5`, `success_threshold=2`, `reset_timeout=300s`.
/// Adapted from the teacher's `resilience::circuit_breaker` (same
/// closed→open→half_open state machine), with the default `reset_timeout`
/// changed from the teacher's 60s to the spec's 300s and the in-flight
/// concurrency cap dropped since the orchestrator already serializes calls
/// per endpoint through its own worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 2, reset_timeout: Duration::from_secs(300) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit open for {endpoint}")]
    Open { endpoint: String },
    #[error("{0}")]
    ExecutionFailed(E),
}

struct State {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    last_failure_time: Option<Instant>,
    half_open_in_flight: bool,
}

impl State {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            half_open_in_flight: false,
        }
    }
}

#[derive(Debug, Default)]
struct Metrics {
    opened_count: AtomicU64,
    rejected_count: AtomicU64,
}

pub struct CircuitBreaker {
    endpoint: String,
    config: CircuitBreakerConfig,
    state: RwLock<State>,
    metrics: Metrics,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self { endpoint: endpoint.into(), config, state: RwLock::new(State::new()), metrics: Metrics::default() }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub fn rejected_count(&self) -> u64 {
        self.metrics.rejected_count.load(Ordering::Relaxed)
    }

    /// Executes `f` under circuit-breaker protection, consulting/updating
    /// state before and after the call.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call::<E>().await?;
        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::ExecutionFailed(e))
            }
        }
    }

    async fn before_call<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = state.last_failure_time.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.reset_timeout {
                    info!(endpoint = %self.endpoint, "circuit breaker transitioning to half_open");
                    state.state = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    state.half_open_in_flight = true;
                    Ok(())
                } else {
                    self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
                    Err(CircuitBreakerError::Open { endpoint: self.endpoint.clone() })
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_in_flight {
                    self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
                    Err(CircuitBreakerError::Open { endpoint: self.endpoint.clone() })
                } else {
                    state.half_open_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::Closed => state.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                state.half_open_in_flight = false;
                if state.consecutive_successes >= self.config.success_threshold {
                    info!(endpoint = %self.endpoint, "circuit breaker closing");
                    state.state = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.consecutive_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        state.last_failure_time = Some(Instant::now());
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(endpoint = %self.endpoint, "circuit breaker opening");
                    state.state = CircuitState::Open;
                    self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            CircuitState::HalfOpen => {
                warn!(endpoint = %self.endpoint, "circuit breaker re-opening after half_open probe failure");
                state.state = CircuitState::Open;
                state.consecutive_failures = self.config.failure_threshold;
                state.half_open_in_flight = false;
                self.metrics.opened_count.fetch_add(1, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }
}

/// Per-endpoint registry so workers share one breaker per agent endpoint
/// rather than one per invocation.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { breakers: DashMap::new(), config }
    }

    pub fn get_or_create(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(endpoint, self.config)))
            .clone()
    }
}
