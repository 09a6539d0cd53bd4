pub mod auth;
pub mod dto;
pub mod error;
pub mod observability;
pub mod routes;
pub mod security;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use agenttrace_audit::storage::AuditStorage;
use agenttrace_audit::AuditLog;
use agenttrace_query::{EventStream, ExportJobTable, RateLimiter};

/// Shared handles every C6 HTTP handler needs. Built once at startup by
/// `agenttrace-cli` and cloned (cheaply, via the inner `Arc`s) into each
/// request, mirroring the teacher's `AppState` convention.
#[derive(Clone)]
pub struct AppState {
    pub audit_log: Arc<AuditLog>,
    pub storage: Arc<dyn AuditStorage>,
    pub export_jobs: Arc<ExportJobTable>,
    pub stream: Arc<EventStream>,
    pub rate_limiter: Arc<RateLimiter>,
    pub jwt_secret: Arc<String>,
}

/// Builds the full `/v1/audit/*` router plus health endpoints (spec.md §6),
/// layered with auth, rate limiting, security headers, and request tracing
/// in the order the teacher's service composes its middleware stack:
/// tracing outermost, then security headers, then auth, then rate limiting
/// closest to the handler (so a rejected/unauthenticated request never
/// consumes a token-bucket slot).
pub fn build_router(state: AppState) -> Router {
    let audit_routes = Router::new()
        .route("/v1/audit/events", get(routes::audit::list_events))
        .route("/v1/audit/events/:id", get(routes::audit::get_event))
        .route("/v1/audit/events/:id/context", get(routes::audit::get_event_context))
        .route("/v1/audit/summary", get(routes::audit::get_summary))
        .route("/v1/audit/actors/:id/activity", get(routes::audit::get_actor_activity))
        .route("/v1/audit/export", post(routes::audit::create_export))
        .route("/v1/audit/export/:id", get(routes::audit::get_export))
        .route("/v1/audit/export/:id/download", get(routes::audit::download_export))
        .route("/v1/audit/stream", get(routes::audit::stream_events))
        .route("/v1/audit/verify", get(routes::audit::verify))
        .route("/v1/audit/checkpoints/:date", get(routes::audit::get_checkpoint))
        .route("/v1/audit/merkle-proof/:event_id", post(routes::audit::merkle_proof))
        .route("/v1/audit/merkle-proof/verify", post(routes::audit::merkle_proof_verify))
        .route("/v1/audit/health", get(routes::health::audit_health))
        .route_layer(middleware::from_fn_with_state(state.clone(), security::rate_limit_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    Router::new()
        .merge(audit_routes)
        .route("/healthz", get(routes::health::liveness))
        .route("/readyz", get(routes::health::readiness))
        .layer(middleware::from_fn(security::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
