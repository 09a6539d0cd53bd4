use std::path::PathBuf;

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

/// Layered runtime configuration (file, then environment — spec.md §6
/// "Environment variables"), modeled on the teacher's
/// `llm-research-lab::config::Config::load` / `llm-research-cli::config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_workers")]
    pub workers: usize,

    pub agenttrace_api_key: Option<String>,
    pub agenttrace_project: Option<String>,
    pub agenttrace_export_url: Option<String>,

    #[serde(default = "default_audit_backend")]
    pub audit_storage_backend: String,
    #[serde(default = "default_audit_path")]
    pub audit_storage_path: String,
    pub audit_bucket: Option<String>,
    #[serde(default = "default_retention_days")]
    pub audit_retention_days: u32,
    #[serde(default = "default_batch_size")]
    pub audit_batch_size: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub audit_batch_interval_ms: u64,

    pub judge_provider: Option<String>,
    pub judge_model: Option<String>,
    #[serde(default = "default_judge_temperature")]
    pub judge_temperature: f64,
    pub judge_max_tokens: Option<u32>,
    #[serde(default = "default_judge_timeout_secs")]
    pub judge_timeout_secs: u64,
    #[serde(default = "default_judge_max_retries")]
    pub judge_max_retries: u32,
    #[serde(default = "default_true")]
    pub judge_cache: bool,

    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

pub(crate) fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
pub(crate) fn default_workers() -> usize {
    4
}
pub(crate) fn default_audit_backend() -> String {
    "local".to_string()
}
pub(crate) fn default_audit_path() -> String {
    "./audit-data".to_string()
}
pub(crate) fn default_retention_days() -> u32 {
    7 * 365
}
pub(crate) fn default_batch_size() -> usize {
    50
}
pub(crate) fn default_batch_interval_ms() -> u64 {
    1_000
}
pub(crate) fn default_judge_temperature() -> f64 {
    0.0
}
pub(crate) fn default_judge_timeout_secs() -> u64 {
    30
}
pub(crate) fn default_judge_max_retries() -> u32 {
    3
}
pub(crate) fn default_true() -> bool {
    true
}
pub(crate) fn default_jwt_secret() -> String {
    "development-secret-change-in-production".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ServiceConfig {
    /// Loads `<config_path>` (if given and present) then overlays
    /// `AGENTTRACE_*`/`AUDIT_*`/`JUDGE_*` environment variables, exactly as
    /// the teacher layers `File` then `Environment` sources.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = ConfigLoader::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        } else {
            builder = builder.add_source(File::with_name("agenttrace").required(false));
        }
        let config = builder
            .add_source(Environment::default().try_parsing(true).separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn defaults_apply_with_no_file_and_no_environment() {
        // `File::with_name("agenttrace")` is optional, so with none of
        // `agenttrace.{toml,yaml,...}` present in the test's cwd, every
        // field falls back to its serde default.
        let config = ServiceConfig::load(None).expect("defaults alone must be loadable");
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.workers, default_workers());
        assert_eq!(config.audit_storage_backend, default_audit_backend());
        assert!(config.judge_cache);
    }

    #[test]
    #[serial]
    fn environment_variables_override_file_and_defaults() {
        std::env::set_var("BIND_ADDR", "127.0.0.1:9090");
        std::env::set_var("AUDIT_RETENTION_DAYS", "30");
        let config = ServiceConfig::load(None).expect("env overlay must be loadable");
        std::env::remove_var("BIND_ADDR");
        std::env::remove_var("AUDIT_RETENTION_DAYS");

        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.audit_retention_days, 30);
    }

    #[test]
    #[serial]
    fn an_explicit_config_file_is_required_and_layered_under_the_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "bind_addr = \"0.0.0.0:7000\"\naudit_storage_backend = \"local\"").unwrap();
        let path = file.path().to_path_buf();

        let config = ServiceConfig::load(Some(&path)).expect("explicit file must load");
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.audit_storage_backend, "local");
    }

    #[test]
    #[serial]
    fn a_missing_explicit_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/path/to/agenttrace.toml");
        assert!(ServiceConfig::load(Some(&path)).is_err());
    }
}
