//! Storage seams consumed by the core.
//!
//! The credential store owns user records; the session store is a flat
//! key/value space with per-key expiry. Implementations live in the
//! submodules: PostgreSQL and Redis for deployment, in-memory for tests and
//! local runs.

pub mod memory;
pub mod postgres;
pub mod redis;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::User;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User already exists")]
    UserExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] ::redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Persistent user records, unique by email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user, returning the new id. `UserExists` when the email is taken.
    async fn save_user(&self, email: &str, password_hash: &str) -> Result<i64, StoreError>;

    /// Fetch a user by email. `UserNotFound` when absent.
    async fn user_by_email(&self, email: &str) -> Result<User, StoreError>;
}

/// Key/value store with per-key TTL. Every operation is single-key and atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Set `key` to `value`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set `key` only if it does not exist. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Get a live value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Run a store call under a deadline, mapping elapse to `StoreError::Timeout`.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
