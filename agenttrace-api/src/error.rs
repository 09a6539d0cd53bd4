use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

use agenttrace_core::error::CoreError;

/// HTTP-facing error type (spec.md §7 "user-visible behavior": structured
/// errors with `code`/`message`/`kind`), modeled on the teacher's
/// `ApiError`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::Validation(msg),
            CoreError::NotFound(msg) => ApiError::NotFound(msg),
            CoreError::QuotaExceeded { message, retry_after_secs } => {
                ApiError::RateLimited { retry_after_secs }.with_message(message)
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn with_message(self, message: String) -> Self {
        match self {
            ApiError::RateLimited { .. } => {
                tracing::warn!(%message, "quota exceeded");
                self
            }
            other => other,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "internal API error");
        }
        let status = self.status();
        let mut body = json!({
            "code": status.as_u16(),
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let ApiError::RateLimited { retry_after_secs } = &self {
            body["retry_after_secs"] = json!(retry_after_secs);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_validation_maps_to_bad_request() {
        let err: ApiError = CoreError::Validation("bad range".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn core_not_found_maps_to_404() {
        let err: ApiError = CoreError::NotFound("event missing".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn core_quota_exceeded_maps_to_rate_limited_with_retry_after() {
        let err: ApiError = CoreError::QuotaExceeded { message: "too many exports".into(), retry_after_secs: 42 }.into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        match err {
            ApiError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 42),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn unmapped_core_errors_become_internal() {
        let err: ApiError = CoreError::Storage("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "internal");
    }

    #[tokio::test]
    async fn response_body_carries_retry_after_for_rate_limited() {
        let response = ApiError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["retry_after_secs"], 7);
        assert_eq!(body["kind"], "rate_limited");
    }
}
