// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lightnovel_common::{ErrorBody, ErrorDetail};
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown username and wrong password collapse into this one variant
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Session not found")]
    SessionNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication rate limit exceeded")]
    AuthRateLimited,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Password hashing error: {0}")]
    Password(#[from] PasswordError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used by services and handlers
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::Validation(_)
            | AppError::InvalidCredentials
            | AppError::UserAlreadyExists => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::SessionNotFound => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded | AppError::AuthRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            },
            AppError::Storage(_)
            | AppError::Timeout(_)
            | AppError::Password(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "VAL_001",
            AppError::Validation(err) => err.error_code(),
            AppError::Unauthorized => "AUTH_001",
            AppError::InvalidCredentials => "AUTH_002",
            AppError::SessionNotFound => "AUTH_003",
            AppError::AuthRateLimited => "AUTH_004",
            AppError::UserAlreadyExists => "ACC_001",
            AppError::NotFound(_) => "NF_001",
            AppError::RateLimitExceeded => "RATE_001",
            AppError::Storage(_) => "STORE_001",
            AppError::Timeout(_) => "TIME_001",
            AppError::Password(_) => "INT_002",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a message that is safe to hand to clients
    pub fn sanitized_message(&self) -> String {
        match self {
            // Input errors describe what the client got wrong
            AppError::InvalidInput(_) | AppError::Validation(_) => self.to_string(),
            AppError::InvalidCredentials => "Invalid username or password".to_string(),
            AppError::Unauthorized | AppError::SessionNotFound => {
                "Authentication required".to_string()
            },
            AppError::UserAlreadyExists => {
                "User already exists, consider login or use another username".to_string()
            },
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::RateLimitExceeded => {
                "Rate limit exceeded, please try again later".to_string()
            },
            AppError::AuthRateLimited => {
                "Too many authentication attempts, please try again later".to_string()
            },
            AppError::Storage(_)
            | AppError::Timeout(_)
            | AppError::Password(_)
            | AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Timeout(_) => tracing::warn!(error = %self, "request failed"),
            _ if status.is_server_error() => tracing::error!(error = %self, "request failed"),
            _ => tracing::debug!(error = %self, status = status.as_u16(), "request rejected"),
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.sanitized_message(),
            },
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::InvalidInput("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::NotFound("user".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::AuthRateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Timeout("get_session").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Storage(StorageError::Backend("disk full".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(AppError::Unauthorized.error_code(), "AUTH_001");
        assert_eq!(AppError::InvalidCredentials.error_code(), "AUTH_002");
        assert_eq!(AppError::UserAlreadyExists.error_code(), "ACC_001");
        assert_eq!(
            AppError::Validation(ValidationError::InvalidUsername("x".to_string())).error_code(),
            "VAL_002"
        );
    }

    #[tokio::test]
    async fn test_storage_errors_do_not_leak() {
        let error = AppError::Storage(StorageError::Backend(
            "connection refused to 10.0.0.3".to_string(),
        ));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error.code, "STORE_001");
        assert!(!body.error.message.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_credential_errors_share_one_shape() {
        let response = AppError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
