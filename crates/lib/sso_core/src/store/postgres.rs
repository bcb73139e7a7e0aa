//! PostgreSQL-backed credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialStore, StoreError};
use crate::models::auth::User;

/// Credential store over the `users` table.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn save_user(&self, email: &str, password_hash: &str) -> Result<i64, StoreError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (email, pass_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::UserExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT id, email, pass_hash, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, email, password_hash, created_at, updated_at)| User {
            id,
            email,
            password_hash,
            created_at,
            updated_at,
        })
        .ok_or(StoreError::UserNotFound)
    }
}
