//! Token lifecycle: stateless access tokens and stateful refresh sessions.
//!
//! Access tokens are HS256 JWTs checked by signature and expiry alone.
//! Refresh tokens are 32 random bytes, URL-safe base64, tracked in the
//! session store under two keys written and removed together:
//!
//! - `sso:session:{user_id}:{sha256(fingerprint)}` → `sha256(token)`
//! - `sso:refresh:{sha256(token)}` → `SessionRecord` JSON
//!
//! Plain token values are never stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::models::auth::{AccessClaims, SessionRecord};
use crate::store::{SessionStore, StoreError, with_deadline};

/// Prefix shared by every key this module writes.
pub const KEY_PREFIX: &str = "sso:";

/// Random bytes per refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Signing secret and lifetimes.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Token manager errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token is expired")]
    Expired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Mints and checks both token kinds. Holds no per-call state.
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    store_timeout: Duration,
    sessions: Arc<dyn SessionStore>,
}

impl TokenManager {
    pub fn new(
        config: &TokenConfig,
        store_timeout: Duration,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        // Pin HS256: a token naming any other algorithm is rejected before
        // its signature is looked at.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            store_timeout,
            sessions,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for `user_id`, valid for the access TTL.
    pub fn issue_access_token(
        &self,
        user_id: i64,
        email: Option<&str>,
    ) -> Result<String, TokenError> {
        self.issue_access_token_at(user_id, email, Utc::now())
    }

    fn issue_access_token_at(
        &self,
        user_id: i64,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = chrono::Duration::from_std(self.access_ttl)
            .map_err(|e| TokenError::Signing(format!("access ttl: {e}")))?;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))
    }

    /// Verify signature, algorithm and expiry, returning the claims.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    /// Verify an access token and extract its subject.
    pub fn validate_access_token(&self, token: &str) -> Result<i64, TokenError> {
        let claims = self.decode_access_token(token)?;
        claims
            .sub
            .parse::<i64>()
            .map_err(|e| TokenError::Invalid(format!("subject: {e}")))
    }

    /// Mint a refresh token bound to `(user_id, fingerprint)`.
    ///
    /// Any session already held by the same device is retired, so a user has
    /// at most one live session per fingerprint.
    pub async fn issue_refresh_token(
        &self,
        user_id: i64,
        fingerprint: &str,
    ) -> Result<String, TokenError> {
        let token = generate_refresh_token();
        let token_hash = sha256_hex(&token);
        let fingerprint_hash = sha256_hex(fingerprint);
        let record = serde_json::to_string(&SessionRecord {
            user_id,
            fingerprint: fingerprint_hash.clone(),
        })
        .map_err(|e| StoreError::Internal(format!("encode session record: {e}")))?;

        let reverse = refresh_key(&token_hash);
        let claimed = self
            .bounded(self.sessions.set_if_absent(&reverse, &record, self.refresh_ttl))
            .await?;
        if !claimed {
            return Err(StoreError::Internal("refresh token collision".into()).into());
        }

        let forward = session_key(user_id, &fingerprint_hash);
        if let Err(e) = self.replace_forward(&forward, &token_hash).await {
            if let Err(cleanup) = self.bounded(self.sessions.delete(&reverse)).await {
                warn!(user_id, error = %cleanup, "failed to drop orphaned refresh entry");
            }
            return Err(e.into());
        }

        Ok(token)
    }

    async fn replace_forward(&self, forward: &str, token_hash: &str) -> Result<(), StoreError> {
        if let Some(previous) = self.bounded(self.sessions.get(forward)).await?
            && previous != token_hash
        {
            self.bounded(self.sessions.delete(&refresh_key(&previous)))
                .await?;
        }
        self.bounded(self.sessions.set(forward, token_hash, self.refresh_ttl))
            .await
    }

    /// Resolve a refresh token to its user, provided the fingerprint matches
    /// the one it was issued for.
    pub async fn validate_refresh_token(
        &self,
        token: &str,
        fingerprint: &str,
    ) -> Result<i64, TokenError> {
        let token_hash = sha256_hex(token);
        let raw = self
            .bounded(self.sessions.get(&refresh_key(&token_hash)))
            .await?
            .ok_or(TokenError::SessionNotFound)?;
        let record: SessionRecord = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Internal(format!("decode session record: {e}")))?;

        if record.fingerprint != sha256_hex(fingerprint) {
            return Err(TokenError::SessionNotFound);
        }

        // Only the token the device's forward key names is live. A reverse
        // entry left behind by a concurrent issue for the same device is not.
        let current = self
            .bounded(self.sessions.get(&session_key(record.user_id, &record.fingerprint)))
            .await?;
        if current.as_deref() != Some(token_hash.as_str()) {
            return Err(TokenError::SessionNotFound);
        }
        Ok(record.user_id)
    }

    /// Drop the session held by `(user_id, fingerprint)`. Absent sessions are
    /// not an error.
    pub async fn revoke_session(&self, user_id: i64, fingerprint: &str) -> Result<(), TokenError> {
        let forward = session_key(user_id, &sha256_hex(fingerprint));
        if let Some(token_hash) = self.bounded(self.sessions.get(&forward)).await? {
            self.bounded(self.sessions.delete(&refresh_key(&token_hash)))
                .await?;
        }
        self.bounded(self.sessions.delete(&forward)).await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_deadline(self.store_timeout, call).await
    }
}

/// Generate a cryptographically random refresh token (32 bytes, URL-safe base64).
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash, hex encoded.
fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn session_key(user_id: i64, fingerprint_hash: &str) -> String {
    format!("{KEY_PREFIX}session:{user_id}:{fingerprint_hash}")
}

fn refresh_key(token_hash: &str) -> String {
    format!("{KEY_PREFIX}refresh:{token_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemorySessionStore;
    use async_trait::async_trait;

    const SECRET: &str = "test-secret";
    const ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
    const REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

    fn config() -> TokenConfig {
        TokenConfig {
            secret: SECRET.into(),
            access_ttl: ACCESS_TTL,
            refresh_ttl: REFRESH_TTL,
        }
    }

    fn manager(sessions: Arc<dyn SessionStore>) -> TokenManager {
        TokenManager::new(&config(), Duration::from_secs(1), sessions)
    }

    fn memory_manager() -> (TokenManager, InMemorySessionStore) {
        let store = InMemorySessionStore::new();
        (manager(Arc::new(store.clone())), store)
    }

    /// Session store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Internal("down".into()))
        }
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Internal("down".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Internal("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Internal("down".into()))
        }
    }

    #[test]
    fn access_token_roundtrip() {
        let (tm, _) = memory_manager();
        let token = tm.issue_access_token(42, Some("a@b.com")).unwrap();
        assert_eq!(tm.validate_access_token(&token).unwrap(), 42);

        let claims = tm.decode_access_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn access_token_expiry_is_issue_time_plus_ttl() {
        let (tm, _) = memory_manager();
        let before = Utc::now().timestamp();
        let token = tm.issue_access_token(1, None).unwrap();
        let claims = tm.decode_access_token(&token).unwrap();

        assert_eq!(claims.exp - claims.iat, ACCESS_TTL.as_secs() as i64);
        let expected = before + ACCESS_TTL.as_secs() as i64;
        assert!((claims.exp - expected).abs() <= 5);
        assert!(claims.email.is_none());
    }

    #[test]
    fn elapsed_access_token_is_expired() {
        let (tm, _) = memory_manager();
        let issued = Utc::now() - chrono::Duration::seconds(ACCESS_TTL.as_secs() as i64 + 1);
        let token = tm.issue_access_token_at(7, None, issued).unwrap();
        assert!(matches!(tm.validate_access_token(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let (tm, _) = memory_manager();
        let other = TokenManager::new(
            &TokenConfig {
                secret: "someone-else".into(),
                ..config()
            },
            Duration::from_secs(1),
            Arc::new(InMemorySessionStore::new()),
        );
        let token = other.issue_access_token(7, None).unwrap();
        assert!(matches!(tm.validate_access_token(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn token_with_unexpected_algorithm_is_invalid() {
        let (tm, _) = memory_manager();
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "7".into(),
            email: None,
            iat: now,
            exp: now + 600,
        };
        let hs512 = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(tm.validate_access_token(&hs512), Err(TokenError::Invalid(_))));

        // {"alg":"none","typ":"JWT"} with the same claims and no signature.
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(matches!(tm.validate_access_token(&unsigned), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_access_token_is_invalid() {
        let (tm, _) = memory_manager();
        for bad in ["", "not.a.jwt", "invalid-access-token"] {
            assert!(matches!(tm.validate_access_token(bad), Err(TokenError::Invalid(_))));
        }
    }

    #[test]
    fn non_numeric_subject_is_invalid() {
        let (tm, _) = memory_manager();
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "alice".into(),
            email: None,
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(tm.validate_access_token(&token), Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn refresh_token_is_32_random_url_safe_bytes() {
        let (tm, _) = memory_manager();
        let a = tm.issue_refresh_token(1, "fp").await.unwrap();
        let b = tm.issue_refresh_token(1, "other").await.unwrap();
        assert_ne!(a, b);
        let decoded = URL_SAFE_NO_PAD.decode(&a).unwrap();
        assert_eq!(decoded.len(), REFRESH_TOKEN_BYTES);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn refresh_token_is_bound_to_fingerprint() {
        let (tm, _) = memory_manager();
        let token = tm.issue_refresh_token(9, "device-a").await.unwrap();

        assert_eq!(tm.validate_refresh_token(&token, "device-a").await.unwrap(), 9);
        assert!(matches!(
            tm.validate_refresh_token(&token, "device-b").await,
            Err(TokenError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_not_found() {
        let (tm, _) = memory_manager();
        assert!(matches!(
            tm.validate_refresh_token("never-issued", "fp").await,
            Err(TokenError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn plain_tokens_are_not_stored() {
        let (tm, store) = memory_manager();
        let token = tm.issue_refresh_token(3, "fp").await.unwrap();
        assert!(store.get(&format!("{KEY_PREFIX}refresh:{token}")).await.unwrap().is_none());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (tm, store) = memory_manager();
        let token = tm.issue_refresh_token(5, "fp").await.unwrap();

        tm.revoke_session(5, "fp").await.unwrap();
        tm.revoke_session(5, "fp").await.unwrap();

        assert!(matches!(
            tm.validate_refresh_token(&token, "fp").await,
            Err(TokenError::SessionNotFound)
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn revoke_leaves_other_devices_alone() {
        let (tm, _) = memory_manager();
        let a = tm.issue_refresh_token(5, "device-a").await.unwrap();
        let b = tm.issue_refresh_token(5, "device-b").await.unwrap();

        tm.revoke_session(5, "device-a").await.unwrap();

        assert!(tm.validate_refresh_token(&a, "device-a").await.is_err());
        assert_eq!(tm.validate_refresh_token(&b, "device-b").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn revoke_is_scoped_to_user() {
        let (tm, _) = memory_manager();
        let token = tm.issue_refresh_token(5, "shared-fp").await.unwrap();

        tm.revoke_session(6, "shared-fp").await.unwrap();

        assert_eq!(tm.validate_refresh_token(&token, "shared-fp").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn reissue_on_same_device_retires_previous_session() {
        let (tm, store) = memory_manager();
        let first = tm.issue_refresh_token(5, "fp").await.unwrap();
        let second = tm.issue_refresh_token(5, "fp").await.unwrap();

        assert!(tm.validate_refresh_token(&first, "fp").await.is_err());
        assert_eq!(tm.validate_refresh_token(&second, "fp").await.unwrap(), 5);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_session_expires_with_ttl() {
        let (tm, _) = memory_manager();
        let token = tm.issue_refresh_token(5, "fp").await.unwrap();

        tokio::time::advance(REFRESH_TTL + Duration::from_secs(1)).await;

        assert!(matches!(
            tm.validate_refresh_token(&token, "fp").await,
            Err(TokenError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn store_failures_surface_as_storage_errors() {
        let tm = manager(Arc::new(BrokenStore));
        assert!(matches!(
            tm.issue_refresh_token(1, "fp").await,
            Err(TokenError::Storage(_))
        ));
        assert!(matches!(
            tm.validate_refresh_token("t", "fp").await,
            Err(TokenError::Storage(_))
        ));
        assert!(matches!(tm.revoke_session(1, "fp").await, Err(TokenError::Storage(_))));
    }

    /// In-memory store that yields to the scheduler before every call, so
    /// concurrent callers interleave between each step.
    struct YieldingStore(InMemorySessionStore);

    #[async_trait]
    impl SessionStore for YieldingStore {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.set(key, value, ttl).await
        }
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            tokio::task::yield_now().await;
            self.0.set_if_absent(key, value, ttl).await
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            tokio::task::yield_now().await;
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn concurrent_issue_for_one_device_leaves_one_live_session() {
        let tm = manager(Arc::new(YieldingStore(InMemorySessionStore::new())));

        let (a, b) = tokio::join!(
            tm.issue_refresh_token(5, "fp"),
            tm.issue_refresh_token(5, "fp")
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let live_a = tm.validate_refresh_token(&a, "fp").await.is_ok();
        let live_b = tm.validate_refresh_token(&b, "fp").await.is_ok();
        assert!(live_a != live_b, "exactly one session may be live: a={live_a} b={live_b}");

        tm.revoke_session(5, "fp").await.unwrap();
        assert!(matches!(
            tm.validate_refresh_token(&a, "fp").await,
            Err(TokenError::SessionNotFound)
        ));
        assert!(matches!(
            tm.validate_refresh_token(&b, "fp").await,
            Err(TokenError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn reverse_entry_without_forward_link_is_not_live() {
        let (tm, store) = memory_manager();
        let token = tm.issue_refresh_token(5, "fp").await.unwrap();

        store
            .delete(&session_key(5, &sha256_hex("fp")))
            .await
            .unwrap();

        assert!(matches!(
            tm.validate_refresh_token(&token, "fp").await,
            Err(TokenError::SessionNotFound)
        ));
    }

    #[test]
    fn config_debug_hides_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains(SECRET));
    }
}
