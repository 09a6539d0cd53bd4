use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStorageBackend {
    Local,
    Objectstore,
}

impl Default for AuditStorageBackend {
    fn default() -> Self {
        AuditStorageBackend::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub storage_backend: AuditStorageBackend,
    #[serde(default = "default_audit_storage_path")]
    pub storage_path: String,
    pub bucket: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: u64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
}

fn default_audit_storage_path() -> String {
    "./data/audit".to_string()
}
fn default_retention_days() -> u32 {
    7 * 365
}
fn default_batch_size() -> usize {
    100
}
fn default_batch_interval_secs() -> u64 {
    5
}
fn default_dedup_window_secs() -> u64 {
    60
}
fn default_max_clock_skew_secs() -> i64 {
    300
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            storage_backend: AuditStorageBackend::default(),
            storage_path: default_audit_storage_path(),
            bucket: None,
            retention_days: default_retention_days(),
            batch_size: default_batch_size(),
            batch_interval_secs: default_batch_interval_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
        }
    }
}

impl AuditConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_provider")]
    pub provider: String,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_judge_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub cache: bool,
}

fn default_judge_provider() -> String {
    "openai".to_string()
}
fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_judge_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: default_judge_provider(),
            model: default_judge_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_judge_timeout_secs(),
            max_retries: default_max_retries(),
            cache: true,
        }
    }
}

/// Layered runtime configuration: `config/default.toml`, then
/// `config/local.toml` (both optional), then `AGENTTRACE_*`/`AUDIT_*`/
/// `JUDGE_*` environment variables, mirroring the teacher's
/// `config::Config::builder()` layering in `llm-research-lab::config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub export_url: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8080
}
fn default_workers() -> usize {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: None,
            project: None,
            export_url: None,
            workers: default_workers(),
            audit: AuditConfig::default(),
            judge: JudgeConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("config/local").required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("AGENTTRACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(
                config::Environment::with_prefix("AUDIT")
                    .separator("__")
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .add_source(
                config::Environment::with_prefix("JUDGE")
                    .separator("__")
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Validation(format!("config load failed: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| CoreError::Validation(format!("config deserialize failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.audit.batch_size, 100);
        assert_eq!(cfg.audit.batch_interval_secs, 5);
        assert_eq!(cfg.judge.max_retries, 3);
        assert_eq!(cfg.judge.temperature, 0.0);
    }
}
