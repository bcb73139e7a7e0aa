//! Authentication and session logic.
//!
//! Provides password hashing, token issuance and validation, request
//! validation, and the orchestrator that sequences them for `sso_api`.

pub mod password;
pub mod service;
pub mod tokens;
pub mod validation;

use thiserror::Error;

pub use validation::ValidationError;

/// Authentication errors. The stable taxonomy every operation reports in.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    UserExists,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Internal error: {0}")]
    Internal(String),
}
