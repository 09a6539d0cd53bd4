use std::time::{Duration, Instant};

use agenttrace_core::error::{CoreError, Result};

use crate::agent::{self, AgentResponse};
use crate::model::{EndpointConfig, Task, TaskExecution};

const DEFAULT_MAX_RETRIES: u32 = 2;

/// Token counting strategy selected via `task.metadata["tokenizer"]` (spec.md
/// §4.5 "Task executor": "counts tokens on both sides (tokenizer selected by
/// `task.metadata.tokenizer` or a default)"). No external tokenizer crate is
/// in the corpus's dependency stack for this subsystem, so a default
/// whitespace tokenizer stands in, with a coarser `chars4` approximation
/// selectable per task for agents whose metadata requests it.
fn count_tokens(text: &str, tokenizer: Option<&str>) -> u64 {
    match tokenizer {
        Some("chars4") => (text.chars().count() as u64).div_ceil(4),
        _ => text.split_whitespace().count() as u64,
    }
}

pub trait ScoreFn: Fn(&Task, &str) -> f64 + Send + Sync {}
impl<T: Fn(&Task, &str) -> f64 + Send + Sync> ScoreFn for T {}

/// `execute_task(agent, task)` (spec.md §4.5 "Task executor"). Scoring is
/// delegated to `score` (the task's own evaluation criteria, kept generic
/// here since C4 evaluators decide how to grade a task's output).
pub async fn execute_task(
    client: &reqwest::Client,
    endpoint: &EndpointConfig,
    task: &Task,
    score: &dyn ScoreFn,
    local_fn: Option<&(dyn Fn(&str) -> Result<AgentResponse> + Send + Sync)>,
) -> TaskExecution {
    let tokenizer = task.metadata.get("tokenizer").map(String::as_str);
    let time_limit = Duration::from_secs(task.time_limit_seconds);
    let max_retries = task
        .metadata
        .get("max_retries")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES);

    let mut attempt = 0u32;
    loop {
        let started = Instant::now();
        match agent::invoke(client, endpoint, &task.prompt, time_limit, local_fn).await {
            Ok(response) => {
                let elapsed = started.elapsed();
                let tokens_input = count_tokens(&task.prompt, tokenizer);
                let tokens_output = count_tokens(&response.output, tokenizer);
                let tokens_total = tokens_input + tokens_output;

                if tokens_total > task.token_budget || elapsed > time_limit {
                    return TaskExecution {
                        task_id: task.id,
                        output: response.output,
                        tool_calls: response.tool_calls,
                        duration: elapsed,
                        tokens_input,
                        tokens_output,
                        score: 0.0,
                        resource_exceeded: true,
                        attempt,
                        error: None,
                    };
                }

                let task_score = score(task, &response.output);
                return TaskExecution {
                    task_id: task.id,
                    output: response.output,
                    tool_calls: response.tool_calls,
                    duration: elapsed,
                    tokens_input,
                    tokens_output,
                    score: task_score,
                    resource_exceeded: false,
                    attempt,
                    error: None,
                };
            }
            Err(e) if is_transient(&e) && attempt < max_retries => {
                let delay = Duration::from_secs(2u64.saturating_pow(attempt));
                tracing::warn!(task_id = %task.id, attempt, error = %e, "transient agent error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return TaskExecution {
                    task_id: task.id,
                    output: String::new(),
                    tool_calls: vec![],
                    duration: started.elapsed(),
                    tokens_input: count_tokens(&task.prompt, tokenizer),
                    tokens_output: 0,
                    score: 0.0,
                    resource_exceeded: false,
                    attempt,
                    error: Some(e.to_string()),
                };
            }
        }
    }
}

fn is_transient(error: &CoreError) -> bool {
    matches!(error, CoreError::AgentError(_) | CoreError::AgentUnreachable(_) | CoreError::AgentTimeout(_))
}
