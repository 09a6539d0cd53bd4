use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::json;

use crate::AppState;

/// `/healthz` — liveness, no dependency checks (modeled on the teacher's
/// `observability::health` liveness probe).
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// `/readyz` — readiness: can the process reach its audit storage backend.
/// A single checkpoint read for a near-certainly-absent date is cheap and
/// exercises the storage round trip without touching real data.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let probe_date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let probe_org = agenttrace_core::domain::ids::OrganizationId::new();
    match state.storage.read_checkpoint(probe_org, probe_date).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ready"}))),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not_ready", "error": e.to_string()}))),
    }
}

/// `GET /v1/audit/health` (spec.md §6 query API surface).
pub async fn audit_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "subscribers": state.stream.subscriber_count(),
        "checked_at": Utc::now(),
    }))
}
