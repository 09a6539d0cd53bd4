use std::collections::HashMap;

use agenttrace_core::domain::ids::{BenchmarkId, CategoryId, SubmissionId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an agent under evaluation is reached (spec.md §4.5 "Agent interface").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    Http {
        url: String,
        auth_scheme: AuthScheme,
        credential: String,
    },
    Local {
        module: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Bearer,
    ApiKey,
    None,
}

/// A submitter's entry into the benchmark (spec.md §4.5 "Submission handler").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub submitter_email: String,
    pub organization: Option<String>,
    pub agent_name: String,
    pub agent_version: String,
    pub endpoint: EndpointConfig,
    pub category_ids: Vec<CategoryId>,
    pub terms_accepted: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checks_performed: Vec<String>,
}

impl ValidationResult {
    pub fn reject(mut self, check: &str, message: impl Into<String>) -> Self {
        self.checks_performed.push(check.to_string());
        self.errors.push(message.into());
        self.valid = false;
        self
    }

    pub fn warn(mut self, check: &str, message: impl Into<String>) -> Self {
        self.checks_performed.push(check.to_string());
        self.warnings.push(message.into());
        self
    }

    pub fn pass(mut self, check: &str) -> Self {
        self.checks_performed.push(check.to_string());
        self
    }
}

/// A single benchmark task (spec.md §4.5 "Task executor").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub category_id: CategoryId,
    pub prompt: String,
    pub time_limit_seconds: u64,
    pub token_budget: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub weight: f64,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: BenchmarkId,
    pub name: String,
    pub version: String,
    pub categories: Vec<Category>,
}

/// One agent invocation's tool call (spec.md §4.5 "Reproducibility").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub params: serde_json::Value,
    pub result: serde_json::Value,
    pub duration: std::time::Duration,
}

/// The result of executing one task against an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: TaskId,
    pub output: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub duration: std::time::Duration,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub score: f64,
    pub resource_exceeded: bool,
    pub attempt: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryExecution {
    pub category_id: CategoryId,
    pub task_executions: Vec<TaskExecution>,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkExecution {
    pub submission_id: SubmissionId,
    pub benchmark_id: BenchmarkId,
    pub category_executions: Vec<CategoryExecution>,
    pub overall_score: f64,
    pub environment: EnvironmentSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// spec.md §4.5 "Reproducibility": captures enough of the runtime's identity
/// to explain score drift between two runs of the same submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub runtime_name: String,
    pub runtime_version: String,
    pub os: String,
    pub arch: String,
    pub core_dependency_versions: HashMap<String, String>,
    pub benchmark_suite_version: String,
    pub seed: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub submission_id: SubmissionId,
    pub completed: usize,
    pub total: usize,
    pub current_task: Option<TaskId>,
    pub status_message: String,
}
