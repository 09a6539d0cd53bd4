use std::collections::HashMap;
use std::time::Duration;

use agenttrace_core::domain::ids::{SubmissionId, TaskId};
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::model::{BenchmarkExecution, EnvironmentSnapshot, Task, ToolCallRecord};

/// `seed = SHA-256(submission_id)[0..8]` (spec.md §4.5 "Reproducibility").
pub fn derive_seed(submission_id: SubmissionId) -> String {
    let digest = Sha256::digest(submission_id.to_string().as_bytes());
    hex::encode(&digest[0..8])
}

pub fn snapshot(submission_id: SubmissionId, benchmark_suite_version: &str) -> EnvironmentSnapshot {
    let mut core_dependency_versions = HashMap::new();
    core_dependency_versions.insert("agenttrace-core".to_string(), env!("CARGO_PKG_VERSION").to_string());

    EnvironmentSnapshot {
        runtime_name: "rustc".to_string(),
        runtime_version: option_env!("RUSTC_VERSION").unwrap_or("unknown").to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        core_dependency_versions,
        benchmark_suite_version: benchmark_suite_version.to_string(),
        seed: derive_seed(submission_id),
        started_at: Utc::now(),
    }
}

/// `sort(tasks, key=H(submission_id || task_id))` (spec.md §4.5
/// "Reproducibility"): deterministic ordering so two runs of the same
/// submission execute tasks in the same sequence regardless of input order.
pub fn deterministic_order(submission_id: SubmissionId, tasks: &mut [Task]) {
    tasks.sort_by_key(|task| order_key(submission_id, task.id));
}

fn order_key(submission_id: SubmissionId, task_id: TaskId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(submission_id.to_string().as_bytes());
    hasher.update(task_id.to_string().as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InvocationRecord {
    pub prompt: String,
    pub response: String,
    pub duration: Duration,
    pub attempt: u32,
}

/// Captures every agent invocation and tool call in time order so a
/// submission's execution can be serialized for later replay.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutionRecorder {
    invocations: Vec<InvocationRecord>,
    tool_calls: Vec<ToolCallRecord>,
}

impl ExecutionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&mut self, prompt: impl Into<String>, response: impl Into<String>, duration: Duration, attempt: u32) {
        self.invocations.push(InvocationRecord { prompt: prompt.into(), response: response.into(), duration, attempt });
    }

    pub fn record_tool_call(&mut self, call: ToolCallRecord) {
        self.tool_calls.push(call);
    }

    pub fn to_trace_file(&self) -> agenttrace_core::error::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReproducibilityReport {
    pub task_order_matches: bool,
    pub prompts_match: bool,
    pub scores_within_tolerance: bool,
    pub mismatches: Vec<String>,
}

/// Compares two runs of the same benchmark for identical task ordering,
/// identical prompts, and score equality within `tolerance`.
pub struct ReproducibilityVerifier {
    pub tolerance: f64,
}

impl ReproducibilityVerifier {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn compare(&self, a: &BenchmarkExecution, b: &BenchmarkExecution) -> ReproducibilityReport {
        let mut mismatches = Vec::new();

        let order_a: Vec<TaskId> =
            a.category_executions.iter().flat_map(|c| c.task_executions.iter().map(|t| t.task_id)).collect();
        let order_b: Vec<TaskId> =
            b.category_executions.iter().flat_map(|c| c.task_executions.iter().map(|t| t.task_id)).collect();
        let task_order_matches = order_a == order_b;
        if !task_order_matches {
            mismatches.push("task execution order differs between runs".to_string());
        }

        let mut prompts_match = true;
        for (ca, cb) in a.category_executions.iter().zip(b.category_executions.iter()) {
            for (ta, tb) in ca.task_executions.iter().zip(cb.task_executions.iter()) {
                if ta.task_id != tb.task_id {
                    prompts_match = false;
                    mismatches.push(format!("task {} / {} mismatched positions", ta.task_id, tb.task_id));
                }
            }
        }

        let mut scores_within_tolerance = true;
        for (ca, cb) in a.category_executions.iter().zip(b.category_executions.iter()) {
            if (ca.weighted_score - cb.weighted_score).abs() > self.tolerance {
                scores_within_tolerance = false;
                mismatches.push(format!(
                    "category {} score diverged: {} vs {}",
                    ca.category_id, ca.weighted_score, cb.weighted_score
                ));
            }
        }

        ReproducibilityReport { task_order_matches, prompts_match, scores_within_tolerance, mismatches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::ids::{BenchmarkId, CategoryId};
    use crate::model::CategoryExecution;

    #[test]
    fn seed_is_deterministic_for_same_submission() {
        let id = SubmissionId::new();
        assert_eq!(derive_seed(id), derive_seed(id));
        assert_eq!(derive_seed(id).len(), 16);
    }

    #[test]
    fn deterministic_order_is_stable_across_calls() {
        let submission_id = SubmissionId::new();
        let mut tasks: Vec<Task> = (0..5)
            .map(|_| Task {
                id: TaskId::new(),
                category_id: CategoryId::new(),
                prompt: String::new(),
                time_limit_seconds: 1,
                token_budget: 1,
                metadata: HashMap::new(),
            })
            .collect();
        let ids_before: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        let mut shuffled = tasks.clone();
        shuffled.reverse();

        deterministic_order(submission_id, &mut tasks);
        deterministic_order(submission_id, &mut shuffled);

        let order1: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        let order2: Vec<TaskId> = shuffled.iter().map(|t| t.id).collect();
        assert_eq!(order1, order2);
        assert_eq!(order1.iter().collect::<std::collections::HashSet<_>>().len(), ids_before.len());
    }

    fn execution(submission_id: SubmissionId, task_ids: &[TaskId], score: f64) -> BenchmarkExecution {
        BenchmarkExecution {
            submission_id,
            benchmark_id: BenchmarkId::new(),
            category_executions: vec![CategoryExecution {
                category_id: CategoryId::new(),
                task_executions: task_ids
                    .iter()
                    .map(|&task_id| crate::model::TaskExecution {
                        task_id,
                        output: String::new(),
                        tool_calls: vec![],
                        duration: Duration::ZERO,
                        tokens_input: 0,
                        tokens_output: 0,
                        score,
                        resource_exceeded: false,
                        attempt: 0,
                        error: None,
                    })
                    .collect(),
                weighted_score: score,
            }],
            overall_score: score,
            environment: snapshot(submission_id, "v1"),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[test]
    fn identical_runs_report_no_mismatches() {
        let submission_id = SubmissionId::new();
        let task_ids = vec![TaskId::new(), TaskId::new()];
        let a = execution(submission_id, &task_ids, 0.8);
        let b = execution(submission_id, &task_ids, 0.8);
        let verifier = ReproducibilityVerifier::new(0.001);
        let report = verifier.compare(&a, &b);
        assert!(report.task_order_matches);
        assert!(report.scores_within_tolerance);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn diverged_scores_are_flagged() {
        let submission_id = SubmissionId::new();
        let task_ids = vec![TaskId::new()];
        let a = execution(submission_id, &task_ids, 0.9);
        let b = execution(submission_id, &task_ids, 0.1);
        let verifier = ReproducibilityVerifier::new(0.01);
        let report = verifier.compare(&a, &b);
        assert!(!report.scores_within_tolerance);
        assert!(!report.mismatches.is_empty());
    }
}
