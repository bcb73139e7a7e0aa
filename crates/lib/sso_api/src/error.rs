//! Wire error taxonomy.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sso_core::auth::AuthError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

/// Remote-error kinds with HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    /// Refused refresh. Reported as `internal` on the wire, but it is an
    /// expected refusal, already logged at warn.
    #[error("Invalid session")]
    InvalidSession,

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "invalid_argument",
            ApiError::AlreadyExists(_) => "already_exists",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::InvalidSession | ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidSession | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::InvalidArgument(m) | ApiError::AlreadyExists(m) => m.clone(),
            ApiError::Unauthenticated => "Unauthenticated".to_string(),
            ApiError::InvalidSession => "Internal server error".to_string(),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "request failed");
                "Internal server error".to_string()
            }
        };
        let body = Json(ErrorResponse {
            code: self.code().to_string(),
            message,
        });
        (self.status(), body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(v) => ApiError::InvalidArgument(v.to_string()),
            AuthError::InvalidCredentials => {
                ApiError::InvalidArgument("Invalid credentials".into())
            }
            AuthError::UserExists => ApiError::AlreadyExists("User already exists".into()),
            AuthError::Unauthenticated => ApiError::Unauthenticated,
            AuthError::InvalidSession => ApiError::InvalidSession,
            AuthError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidArgument(e.body_text())
    }
}
