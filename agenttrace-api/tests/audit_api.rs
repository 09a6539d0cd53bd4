//! End-to-end router tests exercising auth, capability enforcement, and the
//! query/export happy path through `agenttrace_api::build_router`, in the
//! style of the teacher's `tower::ServiceExt::oneshot`-driven handler tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tower::ServiceExt;
use uuid::Uuid;

use agenttrace_api::{auth::Claims, build_router, AppState};
use agenttrace_audit::storage::{AuditStorage, LocalAuditStorage};
use agenttrace_audit::{AuditLog, NoTimestamper};
use agenttrace_query::{EventStream, ExportJobTable, RateLimiter};

const JWT_SECRET: &str = "integration-test-secret";

fn token(org: Uuid, capabilities: &[&str]) -> String {
    let claims = Claims {
        sub: "tester".to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        org,
        capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn test_app() -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn AuditStorage> = Arc::new(LocalAuditStorage::new(dir.path().to_path_buf()));
    let audit_log = Arc::new(AuditLog::new(storage.clone(), Arc::new(NoTimestamper), 10, Duration::from_secs(1), 0, 300));
    let state = AppState {
        audit_log,
        storage,
        export_jobs: Arc::new(ExportJobTable::new()),
        stream: Arc::new(EventStream::default()),
        rate_limiter: Arc::new(RateLimiter::new()),
        jwt_secret: Arc::new(JWT_SECRET.to_string()),
    };
    (build_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoints_require_no_authentication() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn audit_routes_reject_missing_bearer_token() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/audit/events?from=2024-01-01T00:00:00Z&to=2024-01-02T00:00:00Z")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn audit_routes_reject_a_token_missing_the_required_capability() {
    let (app, _dir) = test_app().await;
    let org = Uuid::new_v4();
    let jwt = token(org, &[]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/audit/events?from=2024-01-01T00:00:00Z&to=2024-01-02T00:00:00Z")
                .header("Authorization", format!("Bearer {jwt}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_events_returns_an_empty_result_for_a_quiet_organization() {
    let (app, _dir) = test_app().await;
    let org = Uuid::new_v4();
    let jwt = token(org, &["audit:read"]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/audit/events?from=2024-01-01T00:00:00Z&to=2024-01-02T00:00:00Z")
                .header("Authorization", format!("Bearer {jwt}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn export_job_can_be_created_polled_and_downloaded() {
    let (app, _dir) = test_app().await;
    let org = Uuid::new_v4();
    let jwt = token(org, &["audit:export"]);

    let create_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/audit/export")
                .header("Authorization", format!("Bearer {jwt}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "from": "2024-01-01T00:00:00Z",
                        "to": "2024-01-02T00:00:00Z",
                        "format": "json",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_response.status(), StatusCode::OK);
    let job = body_json(create_response).await;
    let export_id = job["export_id"].as_str().unwrap().to_string();

    let mut status = job["status"].as_str().unwrap().to_string();
    for _ in 0..20 {
        if status == "completed" || status == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        let poll_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/audit/export/{export_id}"))
                    .header("Authorization", format!("Bearer {jwt}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let job = body_json(poll_response).await;
        status = job["status"].as_str().unwrap().to_string();
    }
    assert_eq!(status, "completed");

    let download_response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/audit/export/{export_id}/download"))
                .header("Authorization", format!("Bearer {jwt}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download_response.status(), StatusCode::OK);
    assert_eq!(download_response.headers().get("content-type").unwrap(), "application/octet-stream");
    let bytes = axum::body::to_bytes(download_response.into_body(), usize::MAX).await.unwrap();
    // An empty-range JSON export still renders a well-formed (empty) array.
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(parsed.as_array().unwrap().is_empty());
}
