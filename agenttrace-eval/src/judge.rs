use std::sync::Arc;
use std::time::{Duration, Instant};

use agenttrace_core::error::{CoreError, Result};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::warn;

/// A single judge call's outcome (spec.md §4.4 "Judge client": "`judge(prompt,
/// system?, cache?) → {score∈[0,1], reasoning, confidence?, raw, token_usage}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub score: f64,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    pub raw: String,
    pub token_usage: TokenUsage,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeProvider {
    OpenAi,
    Anthropic,
    Together,
}

impl JudgeProvider {
    fn endpoint<'a>(&self, base_override: Option<&'a str>) -> &'a str {
        if let Some(url) = base_override {
            return url;
        }
        match self {
            JudgeProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
            JudgeProvider::Anthropic => "https://api.anthropic.com/v1/messages",
            JudgeProvider::Together => "https://api.together.xyz/v1/chat/completions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub provider: JudgeProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_concurrency: usize,
    pub cache_ttl: Duration,
    pub expected_max_score: f64,
    /// Per-1k-token price, used for `cost_usd` tracking and `warn_threshold_usd`.
    pub price_per_1k_input: f64,
    pub price_per_1k_output: f64,
    pub warn_threshold_usd: f64,
}

struct CacheEntry {
    response: JudgeResponse,
    inserted_at: Instant,
}

/// Multi-provider LLM-as-judge client (spec.md §4.4). Retries with backoff
/// are delegated to `agenttrace_export::retry::BackoffPolicy`'s shape
/// (base=1s, factor=2, cap=30s) reimplemented locally to avoid a dependency
/// from the evaluation crate onto the export pipeline crate.
pub struct JudgeClient {
    config: JudgeConfig,
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    cache: DashMap<String, CacheEntry>,
    total_cost_usd: std::sync::atomic::AtomicU64,
}

impl JudgeClient {
    pub fn new(config: JudgeConfig) -> Self {
        let client = reqwest::Client::builder().timeout(config.timeout).build().expect("reqwest client builds");
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self { config, client, semaphore, cache: DashMap::new(), total_cost_usd: std::sync::atomic::AtomicU64::new(0) }
    }

    fn cache_key(&self, prompt: &str, system: Option<&str>) -> String {
        let normalized = prompt.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.config.provider).as_bytes());
        hasher.update(self.config.model.as_bytes());
        hasher.update(normalized.as_bytes());
        hasher.update(system.unwrap_or_default().as_bytes());
        hasher.update(self.config.temperature.to_bits().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn judge(&self, prompt: &str, system: Option<&str>, use_cache: bool) -> Result<JudgeResponse> {
        let key = self.cache_key(prompt, system);
        if use_cache {
            if let Some(entry) = self.cache.get(&key) {
                if entry.inserted_at.elapsed() < self.config.cache_ttl {
                    let mut cached = entry.response.clone();
                    cached.cached = true;
                    return Ok(cached);
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            let _permit = self.semaphore.acquire().await.map_err(|_| CoreError::Internal("judge semaphore closed".into()))?;
            match self.call_provider(prompt, system).await {
                Ok(response) => {
                    self.track_cost(&response.token_usage);
                    if use_cache {
                        self.cache.insert(key.clone(), CacheEntry { response: response.clone(), inserted_at: Instant::now() });
                    }
                    return Ok(response);
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(attempt);
                    warn!(attempt, error = %e, "judge call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_provider(&self, prompt: &str, system: Option<&str>) -> Result<JudgeResponse> {
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": system.unwrap_or("You are an evaluation judge.")},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post(self.config.provider.endpoint(self.config.base_url.as_deref()))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Judge(format!("judge request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Judge(format!("judge returned status {}", response.status())));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| CoreError::Judge(e.to_string()))?;
        let raw = extract_content(&payload).unwrap_or_default();
        let token_usage = extract_usage(&payload);
        let score = parse_score(&raw, self.config.expected_max_score)
            .ok_or_else(|| CoreError::Judge(format!("could not parse a score from judge response: {raw}")))?;

        Ok(JudgeResponse { score, reasoning: Some(raw.clone()), confidence: None, raw, token_usage, cached: false })
    }

    fn track_cost(&self, usage: &TokenUsage) {
        let cost = (usage.input_tokens as f64 / 1000.0) * self.config.price_per_1k_input
            + (usage.output_tokens as f64 / 1000.0) * self.config.price_per_1k_output;
        let cost_micros = (cost * 1_000_000.0) as u64;
        let total = self.total_cost_usd.fetch_add(cost_micros, std::sync::atomic::Ordering::Relaxed) + cost_micros;
        if (total as f64 / 1_000_000.0) > self.config.warn_threshold_usd {
            warn!(total_usd = total as f64 / 1_000_000.0, "judge cost exceeded warn threshold");
        }
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd.load(std::sync::atomic::Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1);
    let factor = 2u32.saturating_pow(attempt.min(5));
    (base * factor).min(Duration::from_secs(30))
}

fn extract_content(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("content")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("text"))
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
}

fn extract_usage(payload: &serde_json::Value) -> TokenUsage {
    let usage = payload.get("usage");
    TokenUsage {
        input_tokens: usage
            .and_then(|u| u.get("prompt_tokens").or_else(|| u.get("input_tokens")))
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        output_tokens: usage
            .and_then(|u| u.get("completion_tokens").or_else(|| u.get("output_tokens")))
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    }
}

/// Robust score parsing (spec.md §4.4 "robust parsing — try strict JSON,
/// then JSON-in-fenced-code-block, then regex "Score: X/Y" / "X out of Y",
/// finally fallback heuristics"). Returns a value normalized into `[0,1]`
/// against `expected_max_score`.
pub fn parse_score(raw: &str, expected_max_score: f64) -> Option<f64> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        if let Some(score) = value.get("score").and_then(|s| s.as_f64()) {
            return Some(normalize(score, expected_max_score));
        }
    }

    if let Some(fenced) = extract_fenced_json(raw) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&fenced) {
            if let Some(score) = value.get("score").and_then(|s| s.as_f64()) {
                return Some(normalize(score, expected_max_score));
            }
        }
    }

    static SCORE_OF: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?i)score\s*[:=]?\s*(\d+(?:\.\d+)?)\s*(?:/|out of)\s*(\d+(?:\.\d+)?)").unwrap());
    if let Some(caps) = SCORE_OF.captures(raw) {
        let value: f64 = caps[1].parse().ok()?;
        let max: f64 = caps[2].parse().ok()?;
        if max > 0.0 {
            return Some((value / max).clamp(0.0, 1.0));
        }
    }

    static BARE_NUMBER: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
    if let Some(caps) = BARE_NUMBER.captures(raw) {
        let value: f64 = caps[1].parse().ok()?;
        return Some(normalize(value, expected_max_score));
    }

    None
}

fn normalize(value: f64, expected_max_score: f64) -> f64 {
    if value <= 1.0 {
        value.clamp(0.0, 1.0)
    } else {
        (value / expected_max_score).clamp(0.0, 1.0)
    }
}

fn extract_fenced_json(raw: &str) -> Option<String> {
    static FENCE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());
    FENCE.captures(raw).map(|c| c[1].trim().to_string())
}
