mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use agenttrace_audit::storage::{AuditStorage, LocalAuditStorage, ObjectStoreAuditStorage};
use agenttrace_audit::{AuditLog, NoTimestamper};
use agenttrace_query::{EventStream, ExportJobTable, RateLimiter};

use config::ServiceConfig;

const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_STORAGE_INIT_ERROR: u8 = 3;
const EXIT_SHUTDOWN_TIMEOUT: u8 = 4;

/// `agenttrace` — EAIC service binary (spec.md §6 "CLI surface").
#[derive(Debug, Parser)]
#[command(name = "agenttrace", version, about = "AgentTrace evaluation, audit, and ingestion core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Starts the C6 HTTP surface over the audit log.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        export_url: Option<String>,
        #[arg(long, value_enum, default_value = "local")]
        audit_backend: AuditBackendArg,
        #[arg(long)]
        audit_bucket: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AuditBackendArg {
    Local,
    Objectstore,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    agenttrace_api::observability::init_tracing(agenttrace_api::observability::LogFormat::default());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match cli.command {
        Command::Serve { config, export_url, audit_backend, audit_bucket, workers } => {
            runtime.block_on(serve(config, export_url, audit_backend, audit_bucket, workers))
        }
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    export_url: Option<String>,
    audit_backend: AuditBackendArg,
    audit_bucket: Option<String>,
    workers: Option<usize>,
) -> ExitCode {
    let mut service_config = match ServiceConfig::load(config_path.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(url) = export_url {
        service_config.agenttrace_export_url = Some(url);
    }
    if let Some(bucket) = audit_bucket {
        service_config.audit_bucket = Some(bucket);
    }
    if let Some(workers) = workers {
        service_config.workers = workers;
    }
    service_config.audit_storage_backend = match audit_backend {
        AuditBackendArg::Local => "local".to_string(),
        AuditBackendArg::Objectstore => "objectstore".to_string(),
    };

    let storage: Arc<dyn AuditStorage> = match build_storage(&service_config).await {
        Ok(storage) => storage,
        Err(e) => {
            error!(error = %e, "storage initialization failed");
            return ExitCode::from(EXIT_STORAGE_INIT_ERROR);
        }
    };

    let audit_log = Arc::new(AuditLog::new(
        storage.clone(),
        Arc::new(NoTimestamper),
        service_config.audit_batch_size,
        Duration::from_millis(service_config.audit_batch_interval_ms),
        60,
        300,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let flusher = tokio::spawn(audit_log.clone().run_flusher(shutdown_rx));

    let state = agenttrace_api::AppState {
        audit_log,
        storage,
        export_jobs: Arc::new(ExportJobTable::new()),
        stream: Arc::new(EventStream::default()),
        rate_limiter: Arc::new(RateLimiter::new()),
        jwt_secret: Arc::new(service_config.jwt_secret.clone()),
    };

    let app = agenttrace_api::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&service_config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %service_config.bind_addr, "failed to bind");
            let _ = shutdown_tx.send(());
            return ExitCode::from(EXIT_STORAGE_INIT_ERROR);
        }
    };
    info!(addr = %service_config.bind_addr, workers = service_config.workers, "agenttrace serving");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(());
    let drained = tokio::time::timeout(Duration::from_secs(30), flusher).await;

    if let Err(e) = serve_result {
        error!(error = %e, "server exited with error");
        return ExitCode::from(EXIT_STORAGE_INIT_ERROR);
    }
    if drained.is_err() {
        error!("flusher did not drain within the graceful shutdown grace period");
        return ExitCode::from(EXIT_SHUTDOWN_TIMEOUT);
    }
    ExitCode::SUCCESS
}

async fn build_storage(config: &ServiceConfig) -> anyhow::Result<Arc<dyn AuditStorage>> {
    match config.audit_storage_backend.as_str() {
        "objectstore" => {
            let bucket = config
                .audit_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("AUDIT_BUCKET is required for the objectstore backend"))?;
            let object_store_config = agenttrace_audit::storage::object_store::ObjectStoreConfig {
                bucket,
                retention_days: config.audit_retention_days,
                ..Default::default()
            };
            let storage = ObjectStoreAuditStorage::connect(object_store_config).await?;
            Ok(Arc::new(storage))
        }
        _ => Ok(Arc::new(LocalAuditStorage::new(config.audit_storage_path.clone()))),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(backend: &str) -> ServiceConfig {
        ServiceConfig {
            bind_addr: config::default_bind_addr(),
            workers: config::default_workers(),
            agenttrace_api_key: None,
            agenttrace_project: None,
            agenttrace_export_url: None,
            audit_storage_backend: backend.to_string(),
            audit_storage_path: config::default_audit_path(),
            audit_bucket: None,
            audit_retention_days: config::default_retention_days(),
            audit_batch_size: config::default_batch_size(),
            audit_batch_interval_ms: config::default_batch_interval_ms(),
            judge_provider: None,
            judge_model: None,
            judge_temperature: config::default_judge_temperature(),
            judge_max_tokens: None,
            judge_timeout_secs: config::default_judge_timeout_secs(),
            judge_max_retries: config::default_judge_max_retries(),
            judge_cache: true,
            jwt_secret: config::default_jwt_secret(),
        }
    }

    #[tokio::test]
    async fn build_storage_defaults_to_the_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config("local");
        cfg.audit_storage_path = dir.path().to_string_lossy().to_string();
        assert!(build_storage(&cfg).await.is_ok());
    }

    #[tokio::test]
    async fn objectstore_backend_without_a_bucket_is_a_configuration_error() {
        let cfg = base_config("objectstore");
        let err = build_storage(&cfg).await.unwrap_err();
        assert!(err.to_string().contains("AUDIT_BUCKET"));
    }
}
