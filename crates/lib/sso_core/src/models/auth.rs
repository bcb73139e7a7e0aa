//! Authentication domain models.
//!
//! These are internal domain models, distinct from the wire models in
//! `sso_api` (which carry `#[serde(rename)]` for camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record as held by the credential store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Access + refresh token pair handed back once on login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// User email. Present on tokens minted at login, absent on refreshed ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Value stored under a refresh token's reverse-index key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: i64,
    /// SHA-256 hex of the fingerprint the session was issued for.
    pub fingerprint: String,
}
