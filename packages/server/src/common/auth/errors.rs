use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Coarse category of an [`AuthError`], independent of the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authentication,
    NotFound,
    Upstream,
    Internal,
}

/// Errors surfaced by the registration saga and the session operations.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// Pending registration token is malformed, expired or of the wrong kind.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Session is invalid or expired")]
    SessionInvalid,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::InvalidToken
            | AuthError::InvalidCredentials
            | AuthError::EmailNotVerified
            | AuthError::SessionInvalid => ErrorKind::Authentication,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Upstream(_) | AuthError::Timeout(_) => ErrorKind::Upstream,
            AuthError::DatabaseError(e) if is_unique_violation(e) => ErrorKind::Conflict,
            AuthError::DatabaseError(_) => ErrorKind::Upstream,
            AuthError::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidToken => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::SessionInvalid => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AuthError::DatabaseError(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AuthError::DatabaseError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak database or internal details to clients
        let message = match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::Upstream if matches!(self, AuthError::DatabaseError(_)) => {
                "Service temporarily unavailable".to_string()
            }
            ErrorKind::Conflict if matches!(self, AuthError::DatabaseError(_)) => {
                "Resource already exists".to_string()
            }
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
