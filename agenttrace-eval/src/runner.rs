use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agenttrace_core::domain::eval::EvalResult;
use agenttrace_core::domain::ids::TraceId;
use agenttrace_core::domain::trace::Trace;
use agenttrace_core::error::CoreError;
use agenttrace_core::traits::Evaluator;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::warn;

/// spec.md §3 "TraceEvaluation".
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvaluation {
    pub trace_id: TraceId,
    pub results: Vec<EvalResult>,
    pub overall_score: f64,
    pub passed: bool,
    pub errors: Vec<String>,
}

/// spec.md §3 "BatchEvaluation": per-score-name means and the full
/// distribution of recorded values, over a set of traces.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchEvaluation {
    pub evaluations: Vec<TraceEvaluation>,
    pub score_means: HashMap<String, f64>,
    pub score_distributions: HashMap<String, Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrency: usize,
    pub timeout_per_trace: Duration,
    pub continue_on_error: bool,
    pub required_evaluators: Vec<String>,
    pub score_weights: HashMap<String, f64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            timeout_per_trace: Duration::from_secs(60),
            continue_on_error: true,
            required_evaluators: Vec::new(),
            score_weights: HashMap::new(),
        }
    }
}

/// C4 evaluation runner (spec.md §4.4 "Runner contract").
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// `evaluate_trace(trace, evaluators?)` (spec.md §4.4 "Single-trace
    /// algorithm"). A deadline of `timeout_per_trace` bounds the whole call;
    /// timing out surfaces as an error and forces `passed=false`.
    pub async fn evaluate_trace(&self, trace: &Trace, evaluators: &[Arc<dyn Evaluator>]) -> TraceEvaluation {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let deadline = self.config.timeout_per_trace;

        let run = async {
            let futures = evaluators.iter().map(|evaluator| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    (evaluator.name().to_string(), evaluator.evaluate(trace).await)
                }
            });
            join_all(futures).await
        };

        let outcomes = match tokio::time::timeout(deadline, run).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                return TraceEvaluation {
                    trace_id: trace.trace_id,
                    results: Vec::new(),
                    overall_score: 0.0,
                    passed: false,
                    errors: vec![format!("evaluation timed out after {:?}", deadline)],
                };
            }
        };

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut present_evaluators = Vec::new();

        for (name, outcome) in outcomes {
            present_evaluators.push(name.clone());
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    errors.push(format!("{name}: {e}"));
                    if !self.config.continue_on_error {
                        warn!(evaluator = %name, error = %e, "evaluator failed, aborting trace (continue_on_error=false)");
                        break;
                    }
                }
            }
        }

        let missing_required: Vec<&String> = self
            .config
            .required_evaluators
            .iter()
            .filter(|r| !present_evaluators.contains(r) || errors.iter().any(|e| e.starts_with(r.as_str())))
            .collect();

        let overall_score = self.weighted_overall(&results);
        let all_results_passed = results.iter().all(EvalResult::all_passed);
        let passed = missing_required.is_empty() && errors.is_empty() && all_results_passed;

        TraceEvaluation { trace_id: trace.trace_id, results, overall_score, passed, errors }
    }

    fn weighted_overall(&self, results: &[EvalResult]) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for result in results {
            let weight = self.config.score_weights.get(&result.evaluator_name).copied().unwrap_or(1.0);
            if let Some(mean) = result.mean_score() {
                numerator += weight * mean;
                denominator += weight;
            }
        }
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    /// `evaluate_batch(traces[], progress_cb?)` (spec.md §4.4 "Batch
    /// algorithm"). Traces run concurrently bounded by `max_concurrency`
    /// shared across the whole batch, not per-trace.
    pub async fn evaluate_batch<F>(
        &self,
        traces: &[Trace],
        evaluators: &[Arc<dyn Evaluator>],
        mut progress_cb: Option<F>,
    ) -> BatchEvaluation
    where
        F: FnMut(usize, usize),
    {
        let total = traces.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut evaluations = Vec::with_capacity(total);

        for (completed, trace) in traces.iter().enumerate() {
            let _permit = semaphore.acquire().await.ok();
            let evaluation = self.evaluate_trace(trace, evaluators).await;
            evaluations.push(evaluation);
            if let Some(cb) = progress_cb.as_mut() {
                cb(completed + 1, total);
            }
        }

        let mut score_distributions: HashMap<String, Vec<f64>> = HashMap::new();
        for evaluation in &evaluations {
            for result in &evaluation.results {
                for (name, score) in &result.scores {
                    score_distributions.entry(name.clone()).or_default().push(score.value);
                }
            }
        }
        let score_means = score_distributions
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().sum::<f64>() / values.len().max(1) as f64))
            .collect();

        BatchEvaluation { evaluations, score_means, score_distributions }
    }
}

pub fn missing_required_error(name: &str) -> CoreError {
    CoreError::Validation(format!("required evaluator '{name}' did not run"))
}
