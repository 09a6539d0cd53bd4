use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::agent::AgentResponse;
use crate::executor::{execute_task, ScoreFn};
use crate::model::{Benchmark, BenchmarkExecution, Category, CategoryExecution, EndpointConfig};
use crate::reproducibility::{deterministic_order, snapshot};
use agenttrace_core::domain::ids::SubmissionId;
use agenttrace_core::error::Result as CoreResult;

const DEFAULT_CATEGORY_CONCURRENCY: usize = 3;

/// Executes one category's tasks under a bounded semaphore (spec.md §4.5
/// "Category & benchmark execution": "tasks execute with a bounded semaphore
/// (default 3) under deterministic ordering").
pub async fn run_category(
    client: &reqwest::Client,
    endpoint: &EndpointConfig,
    submission_id: SubmissionId,
    category: &Category,
    score: &dyn ScoreFn,
    local_fn: Option<&(dyn Fn(&str) -> CoreResult<AgentResponse> + Send + Sync)>,
    concurrency: usize,
) -> CategoryExecution {
    let mut tasks = category.tasks.clone();
    deterministic_order(submission_id, &mut tasks);

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let semaphore = semaphore.clone();
        let client = client.clone();
        let endpoint = endpoint.clone();
        handles.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            execute_task(&client, &endpoint, &task, score, local_fn).await
        });
    }

    let task_executions = futures::future::join_all(handles).await;
    let weighted_score = mean_score(&task_executions);

    CategoryExecution { category_id: category.id, task_executions, weighted_score }
}

fn mean_score(executions: &[crate::model::TaskExecution]) -> f64 {
    if executions.is_empty() {
        return 0.0;
    }
    executions.iter().map(|t| t.score).sum::<f64>() / executions.len() as f64
}

/// Runs a full benchmark: categories execute sequentially, each feeding the
/// overall weighted score via the category's own `weight` (spec.md §4.5:
/// "each category result feeds into the BenchmarkExecution and overall
/// weighted score via C4's category weights").
pub async fn run_benchmark(
    client: &reqwest::Client,
    endpoint: &EndpointConfig,
    submission_id: SubmissionId,
    benchmark: &Benchmark,
    score: &dyn ScoreFn,
    local_fn: Option<&(dyn Fn(&str) -> CoreResult<AgentResponse> + Send + Sync)>,
) -> BenchmarkExecution {
    let started_at = Utc::now();
    let mut category_executions = Vec::with_capacity(benchmark.categories.len());
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for category in &benchmark.categories {
        let execution =
            run_category(client, endpoint, submission_id, category, score, local_fn, DEFAULT_CATEGORY_CONCURRENCY).await;
        numerator += category.weight * execution.weighted_score;
        denominator += category.weight;
        category_executions.push(execution);
    }

    let overall_score = if denominator > 0.0 { numerator / denominator } else { 0.0 };

    BenchmarkExecution {
        submission_id,
        benchmark_id: benchmark.id,
        category_executions,
        overall_score,
        environment: snapshot(submission_id, &benchmark.version),
        started_at,
        finished_at: Some(Utc::now()),
    }
}
