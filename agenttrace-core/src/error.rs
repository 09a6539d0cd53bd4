use thiserror::Error;

/// The error taxonomy shared by every EAIC component (spec §7). Each variant's
/// `kind()` is the stable, machine-readable string surfaced over the HTTP API.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("quota exceeded: {message} (retry after {retry_after_secs}s)")]
    QuotaExceeded {
        message: String,
        retry_after_secs: u64,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("judge error: {0}")]
    Judge(String),

    #[error("agent error: {0}")]
    AgentError(String),

    #[error("agent timeout after {0:?}")]
    AgentTimeout(std::time::Duration),

    #[error("agent unreachable: {0}")]
    AgentUnreachable(String),

    #[error("resource exceeded: {0}")]
    ResourceExceeded(String),

    #[error("circuit open for endpoint {0}")]
    CircuitOpen(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Stable machine-readable kind, independent of the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::QuotaExceeded { .. } => "quota_exceeded",
            CoreError::Storage(_) => "storage_error",
            CoreError::Integrity(_) => "integrity_error",
            CoreError::Judge(_) => "judge_error",
            CoreError::AgentError(_) => "agent_error",
            CoreError::AgentTimeout(_) => "agent_timeout",
            CoreError::AgentUnreachable(_) => "agent_unreachable",
            CoreError::ResourceExceeded(_) => "resource_exceeded",
            CoreError::CircuitOpen(_) => "circuit_open",
            CoreError::NotFound(_) => "not_found",
            CoreError::Internal(_) => "internal_error",
            CoreError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the caller should retry this operation unassisted (errors that
    /// already carry their own retry policy, e.g. judge/agent calls, return
    /// false here since retries happened internally before surfacing).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_) | CoreError::AgentError(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(CoreError::Validation("x".into()).kind(), "validation_error");
        assert_eq!(
            CoreError::QuotaExceeded { message: "x".into(), retry_after_secs: 60 }.kind(),
            "quota_exceeded"
        );
        assert_eq!(CoreError::CircuitOpen("e1".into()).kind(), "circuit_open");
    }

    #[test]
    fn storage_and_agent_errors_are_retryable() {
        assert!(CoreError::Storage("disk full".into()).is_retryable());
        assert!(CoreError::AgentError("500".into()).is_retryable());
        assert!(!CoreError::ResourceExceeded("budget".into()).is_retryable());
    }
}
