use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

use agenttrace_query::RateLimitScope;

use crate::{auth::AuthUser, error::ApiError, AppState};

/// Adds the baseline response headers the teacher's
/// `security::headers::security_headers_middleware` applies to every route
/// (HSTS, nosniff, deny-framing, referrer policy). CSP is omitted: this is a
/// JSON API with no document responses to restrict script origins for.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static("max-age=31536000; includeSubDomains"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin"));
    response
}

/// Token-bucket rate limiting keyed by the authenticated principal and a
/// scope picked from the request path (spec.md §4.6 "Rate limiting": query
/// 60/min, export 10/min, stream 5/min), adapted from the teacher's
/// `rate_limit_middleware`.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let scope = scope_for_path(request.uri().path());
    let principal = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.principal.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    state.rate_limiter.check(&principal, scope).map_err(|wait| ApiError::RateLimited {
        retry_after_secs: wait.as_secs().max(1),
    })?;

    Ok(next.run(request).await)
}

fn scope_for_path(path: &str) -> RateLimitScope {
    if path.starts_with("/v1/audit/export") {
        RateLimitScope::Export
    } else if path.starts_with("/v1/audit/stream") {
        RateLimitScope::Stream
    } else {
        RateLimitScope::Query
    }
}
