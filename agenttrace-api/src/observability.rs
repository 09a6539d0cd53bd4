//! Structured logging and metrics bootstrap (SPEC_FULL.md §2 ambient stack),
//! modeled on the teacher's `observability::logging::init_logging` /
//! `observability::metrics` but scaled to what this service actually emits.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` (or `AGENTTRACE_LOG`
/// if set) drives per-module filtering; falls back to `info`.
pub fn init_tracing(format: LogFormat) {
    let filter = std::env::var("AGENTTRACE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => {
            let _ = registry.with(fmt::layer().json()).try_init();
        }
        LogFormat::Pretty => {
            let _ = registry.with(fmt::layer().pretty()).try_init();
        }
    }
}

/// Installs the process-wide Prometheus recorder and returns the handle the
/// caller exposes on `/metrics` (carried even though the spec's dashboard UI
/// is out of scope — metric emission is an ambient concern, not a UI).
pub fn install_metrics_recorder() -> Option<metrics_exporter_prometheus::PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| tracing::warn!(%err, "failed to install prometheus recorder"))
        .ok()
}
