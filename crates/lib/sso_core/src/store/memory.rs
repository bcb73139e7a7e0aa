//! In-memory store implementations. Good for development and testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CredentialStore, SessionStore, StoreError};
use crate::models::auth::User;

#[derive(Default)]
struct Users {
    by_email: HashMap<String, User>,
    last_id: i64,
}

/// Credential store held in a `HashMap`, keyed by email.
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    inner: Arc<RwLock<Users>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.inner.read().await.by_email.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save_user(&self, email: &str, password_hash: &str) -> Result<i64, StoreError> {
        let mut users = self.inner.write().await;
        if users.by_email.contains_key(email) {
            return Err(StoreError::UserExists);
        }
        users.last_id += 1;
        let now = Utc::now();
        let user = User {
            id: users.last_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        users.by_email.insert(email.to_string(), user);
        Ok(id)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.inner
            .read()
            .await
            .by_email
            .get(email)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }
}

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Session store held in a `HashMap` with lazy expiry.
///
/// Uses the tokio clock, so tests can drive expiry with `tokio::time::advance`.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live())
            .count()
    }

    /// Whether no live keys remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop `key` if it is still expired once the write lock is held. A
    /// fresh value written since the caller looked is kept.
    async fn remove_if_expired(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live()) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(Entry::is_live) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                drop(entries);
                self.remove_if_expired(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|e| e.is_live()))
    }
}
