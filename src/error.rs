use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// State conflicts detected at the atomic-write layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("already checked in for this date")]
    AlreadyCheckedIn,

    #[error("already checked out for this date")]
    AlreadyCheckedOut,

    #[error("no active check-in found for this date")]
    NotCheckedIn,

    #[error("attendance request already processed")]
    AlreadyDecided,

    #[error("a pending attendance request already exists for this date")]
    DuplicateRequest,

    #[error("claim is not approved or already belongs to an open batch")]
    ClaimUnavailable,

    #[error("batch status does not allow this transition")]
    InvalidBatchTransition,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    /// Returns the conflict kind when this is a state conflict
    pub fn conflict(&self) -> Option<Conflict> {
        match self {
            EngineError::Conflict(c) => Some(*c),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            EngineError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_map_to_409() {
        let err = EngineError::from(Conflict::AlreadyCheckedIn);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.conflict(), Some(Conflict::AlreadyCheckedIn));
    }

    #[test]
    fn test_storage_errors_are_not_leaked() {
        let err = EngineError::Storage("connection refused to 10.0.0.4".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.conflict(), None);
    }

    #[test]
    fn test_policy_and_authorization_status_codes() {
        assert_eq!(
            EngineError::PolicyViolation("no areas".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::Unauthorized("employee".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            EngineError::validation("reason").status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
