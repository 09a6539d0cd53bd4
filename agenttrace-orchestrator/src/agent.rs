use std::time::{Duration, Instant};

use agenttrace_core::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

use crate::model::{AuthScheme, EndpointConfig, ToolCallRecord};

const MAX_INPUT_BYTES: usize = 100 * 1024;
const MAX_OUTPUT_BYTES: usize = 50 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub duration: Duration,
    pub truncated: bool,
}

/// `invoke(prompt, config, timeout)` (spec.md §4.5 "Agent interface"). HTTP
/// endpoints get a POST with the configured auth scheme; local endpoints are
/// resolved through `local_fn` (the orchestrator's in-process registry,
/// injected so this module stays test-friendly).
pub async fn invoke(
    client: &reqwest::Client,
    endpoint: &EndpointConfig,
    prompt: &str,
    timeout: Duration,
    local_fn: Option<&(dyn Fn(&str) -> Result<AgentResponse> + Send + Sync)>,
) -> Result<AgentResponse> {
    if prompt.len() > MAX_INPUT_BYTES {
        return Err(CoreError::Validation(format!(
            "agent prompt exceeds {MAX_INPUT_BYTES} bytes (was {})",
            prompt.len()
        )));
    }

    let started = Instant::now();
    let result = match endpoint {
        EndpointConfig::Http { url, auth_scheme, credential } => {
            invoke_http(client, url, auth_scheme, credential, prompt, timeout).await
        }
        EndpointConfig::Local { module } => invoke_local(module, prompt, local_fn),
    };

    result.map(|mut response| {
        response.duration = started.elapsed();
        truncate_output(&mut response);
        response
    })
}

async fn invoke_http(
    client: &reqwest::Client,
    url: &str,
    auth_scheme: &AuthScheme,
    credential: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<AgentResponse> {
    let mut request = client.post(url).timeout(timeout).json(&serde_json::json!({ "prompt": prompt }));
    request = match auth_scheme {
        AuthScheme::Bearer => request.bearer_auth(credential),
        AuthScheme::ApiKey => request.header("X-API-Key", credential),
        AuthScheme::None => request,
    };

    let response = request.send().await.map_err(classify_reqwest_error)?;
    let status = response.status();
    if status.as_u16() == 408 || status.as_u16() == 504 {
        return Err(CoreError::AgentTimeout(timeout));
    }
    if !status.is_success() {
        return Err(CoreError::AgentError(format!("endpoint returned status {status}")));
    }

    let payload: AgentHttpPayload = response.json().await.map_err(|e| CoreError::AgentError(e.to_string()))?;
    Ok(AgentResponse { output: payload.output, tool_calls: payload.tool_calls, duration: Duration::ZERO, truncated: false })
}

fn invoke_local(
    module: &str,
    prompt: &str,
    local_fn: Option<&(dyn Fn(&str) -> Result<AgentResponse> + Send + Sync)>,
) -> Result<AgentResponse> {
    match local_fn {
        Some(f) => f(prompt),
        None => Err(CoreError::AgentUnreachable(format!("local module '{module}' is not registered"))),
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> CoreError {
    if e.is_timeout() {
        CoreError::AgentTimeout(Duration::from_secs(0))
    } else if e.is_connect() {
        CoreError::AgentUnreachable(e.to_string())
    } else {
        CoreError::AgentError(e.to_string())
    }
}

fn truncate_output(response: &mut AgentResponse) {
    if response.output.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !response.output.is_char_boundary(cut) {
            cut -= 1;
        }
        response.output.truncate(cut);
        response.truncated = true;
    }
}

#[derive(Debug, Deserialize)]
struct AgentHttpPayload {
    output: String,
    #[serde(default)]
    tool_calls: Vec<ToolCallRecord>,
}
