use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::agent::AgentResponse;
use crate::category::run_benchmark;
use crate::circuit_breaker::{CircuitBreakerError, CircuitBreakerRegistry};
use crate::executor::ScoreFn;
use crate::model::{Benchmark, BenchmarkExecution, EndpointConfig, ExecutionProgress, Submission};
use crate::queue::SubmissionQueue;
use crate::shutdown::ShutdownCoordinator;
use agenttrace_core::error::{CoreError, Result};

const DEFAULT_NUM_WORKERS: usize = 3;

/// Resolves a submission's accepted category ids into the benchmark it runs
/// against. Kept as a trait object so the orchestrator doesn't depend on
/// wherever benchmark definitions are actually stored (C6's query layer, a
/// config file, ...).
pub trait BenchmarkResolver: Send + Sync {
    fn resolve(&self, submission: &Submission) -> Benchmark;
}

/// `num_workers` (default 3) draining the submission queue (spec.md §4.5
/// "Orchestrator workers"). Each worker pulls a submission, consults the
/// per-endpoint circuit breaker, and invokes the benchmark executor.
pub struct WorkerPool {
    queue: Arc<SubmissionQueue>,
    breakers: Arc<CircuitBreakerRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    progress: broadcast::Sender<ExecutionProgress>,
    num_workers: usize,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<SubmissionQueue>,
        breakers: Arc<CircuitBreakerRegistry>,
        shutdown: Arc<ShutdownCoordinator>,
        num_workers: Option<usize>,
    ) -> Self {
        let (progress, _rx) = broadcast::channel(256);
        Self { queue, breakers, shutdown, progress, num_workers: num_workers.unwrap_or(DEFAULT_NUM_WORKERS) }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.progress.subscribe()
    }

    /// Spawns `num_workers` tasks draining `queue` until the shutdown token
    /// fires; returns their join handles so callers can await a full drain.
    pub fn spawn(
        self: &Arc<Self>,
        client: reqwest::Client,
        resolver: Arc<dyn BenchmarkResolver>,
        score: Arc<dyn ScoreFn>,
        local_fn: Option<Arc<dyn Fn(&str) -> Result<AgentResponse> + Send + Sync>>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.num_workers)
            .map(|worker_id| {
                let pool = Arc::clone(self);
                let client = client.clone();
                let resolver = resolver.clone();
                let score = score.clone();
                let local_fn = local_fn.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, client, resolver, score, local_fn).await })
            })
            .collect()
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        client: reqwest::Client,
        resolver: Arc<dyn BenchmarkResolver>,
        score: Arc<dyn ScoreFn>,
        local_fn: Option<Arc<dyn Fn(&str) -> Result<AgentResponse> + Send + Sync>>,
    ) {
        let cancel = self.shutdown.cancellation_token();
        info!(worker_id, "orchestrator worker started");
        loop {
            let submission = tokio::select! {
                _ = cancel.cancelled() => break,
                submission = self.queue.pop() => submission,
            };

            let execution = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker_id, submission_id = %submission.id, "cancelled before execution started");
                    break;
                }
                execution = self.execute_submission(&client, &resolver, &score, local_fn.as_deref(), &submission) => execution,
            };

            match execution {
                Ok(_) => info!(worker_id, submission_id = %submission.id, "submission execution completed"),
                Err(e) => error!(worker_id, submission_id = %submission.id, error = %e, "submission execution failed"),
            }
        }
        info!(worker_id, "orchestrator worker stopped");
    }

    async fn execute_submission(
        &self,
        client: &reqwest::Client,
        resolver: &Arc<dyn BenchmarkResolver>,
        score: &Arc<dyn ScoreFn>,
        local_fn: Option<&(dyn Fn(&str) -> Result<AgentResponse> + Send + Sync)>,
        submission: &Submission,
    ) -> Result<BenchmarkExecution> {
        let endpoint = submission.endpoint.clone();
        let endpoint_key = endpoint_key(&endpoint);
        let breaker = self.breakers.get_or_create(&endpoint_key);
        let benchmark = resolver.resolve(submission);
        let total = benchmark.categories.iter().map(|c| c.tasks.len()).sum();

        let submission_id = submission.id;
        let progress = self.progress.clone();
        let _ = progress.send(ExecutionProgress {
            submission_id,
            completed: 0,
            total,
            current_task: None,
            status_message: "started".to_string(),
        });

        // The breaker's closure must itself fail for open/half_open counting
        // to mean anything; a benchmark run whose tasks all errored against
        // the agent counts as a failed probe even though `run_benchmark`
        // never returns `Err` (individual task failures are captured inline).
        let result = breaker
            .call(|| async {
                let execution = run_benchmark(client, &endpoint, submission_id, &benchmark, score.as_ref(), local_fn).await;
                match first_agent_error(&execution) {
                    Some(e) => Err(e),
                    None => Ok(execution),
                }
            })
            .await;

        match result {
            Ok(execution) => {
                let _ = progress.send(ExecutionProgress {
                    submission_id,
                    completed: total,
                    total,
                    current_task: None,
                    status_message: "completed".to_string(),
                });
                Ok(execution)
            }
            Err(CircuitBreakerError::Open { endpoint }) => Err(CoreError::CircuitOpen(endpoint)),
            Err(CircuitBreakerError::ExecutionFailed(e)) => Err(e),
        }
    }
}

fn first_agent_error(execution: &BenchmarkExecution) -> Option<CoreError> {
    execution
        .category_executions
        .iter()
        .flat_map(|c| c.task_executions.iter())
        .find_map(|t| t.error.clone())
        .map(CoreError::AgentError)
}

fn endpoint_key(endpoint: &EndpointConfig) -> String {
    match endpoint {
        EndpointConfig::Http { url, .. } => url.clone(),
        EndpointConfig::Local { module } => format!("local:{module}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::ids::{CategoryId, SubmissionId, TaskId};
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedBenchmark(Benchmark);
    impl BenchmarkResolver for FixedBenchmark {
        fn resolve(&self, _submission: &Submission) -> Benchmark {
            self.0.clone()
        }
    }

    fn benchmark() -> Benchmark {
        Benchmark {
            id: agenttrace_core::domain::ids::BenchmarkId::new(),
            name: "bm".into(),
            version: "v1".into(),
            categories: vec![crate::model::Category {
                id: CategoryId::new(),
                name: "c".into(),
                weight: 1.0,
                tasks: vec![crate::model::Task {
                    id: TaskId::new(),
                    category_id: CategoryId::new(),
                    prompt: "hi".into(),
                    time_limit_seconds: 5,
                    token_budget: 1000,
                    metadata: HashMap::new(),
                }],
            }],
        }
    }

    fn submission() -> Submission {
        Submission {
            id: SubmissionId::new(),
            submitter_email: "a@b.com".into(),
            organization: None,
            agent_name: "agent".into(),
            agent_version: "1.0.0".into(),
            endpoint: EndpointConfig::Local { module: "m".into() },
            category_ids: vec![],
            terms_accepted: true,
            submitted_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_and_reports_completion_progress() {
        let queue = Arc::new(SubmissionQueue::new());
        let breakers = Arc::new(CircuitBreakerRegistry::default());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let pool = Arc::new(WorkerPool::new(queue.clone(), breakers, shutdown.clone(), Some(1)));
        let mut progress_rx = pool.subscribe_progress();

        let resolver: Arc<dyn BenchmarkResolver> = Arc::new(FixedBenchmark(benchmark()));
        let score: Arc<dyn ScoreFn> = Arc::new(|_t: &crate::model::Task, _o: &str| 1.0);
        let local_fn: Arc<dyn Fn(&str) -> Result<AgentResponse> + Send + Sync> = Arc::new(|_p: &str| {
            Ok(AgentResponse { output: "ok".into(), tool_calls: vec![], duration: Duration::ZERO, truncated: false })
        });

        let handles = pool.spawn(reqwest::Client::new(), resolver, score, Some(local_fn));
        queue.push(submission()).await;

        let started = progress_rx.recv().await.unwrap();
        assert_eq!(started.status_message, "started");
        let completed = progress_rx.recv().await.unwrap();
        assert_eq!(completed.status_message, "completed");

        shutdown.stop_immediate().await;
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }
    }
}
