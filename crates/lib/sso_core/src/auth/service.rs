//! Auth orchestrator: register, login, refresh, logout and introspection
//! over the credential store, password hasher and token manager.
//!
//! Every call is one synchronous transition with no state of its own.
//! Collaborator failures are folded into [`AuthError`] here; nothing from a
//! store crosses this boundary raw.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::AuthError;
use super::password::PasswordHasher;
use super::tokens::{TokenError, TokenManager};
use super::validation;
use crate::models::auth::TokenPair;
use crate::store::{CredentialStore, StoreError, with_deadline};

/// Stand-in compared against when the email is unknown, so both login
/// failures cost one password verification.
const DUMMY_PASSWORD: &str = "sso-dummy-password";

/// Log an unclassified failure in full and hand back the opaque kind.
fn internal(context: &str, err: impl Display) -> AuthError {
    error!(error = %err, "{context}");
    AuthError::Internal(format!("{context}: {err}"))
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenManager,
    store_timeout: Duration,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenManager,
        store_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            hasher,
            tokens,
            store_timeout,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Create an account, then log straight in with the same credentials.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        fingerprint: &str,
    ) -> Result<TokenPair, AuthError> {
        validation::validate_register(email, password, fingerprint)?;
        info!("registering new user");

        let hash = self.hash_password(password).await?;
        let saved = with_deadline(self.store_timeout, self.credentials.save_user(email, &hash)).await;
        match saved {
            Ok(user_id) => info!(user_id, "registered new user"),
            Err(StoreError::UserExists) => {
                warn!("registration refused: user already exists");
                return Err(AuthError::UserExists);
            }
            Err(e) => return Err(internal("failed to save user", e)),
        }

        self.login(email, password, fingerprint)
            .await
            .map_err(|e| match e {
                AuthError::Internal(_) => e,
                other => internal("login after register failed", other),
            })
    }

    /// Check credentials and issue a token pair bound to `fingerprint`.
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: &str,
    ) -> Result<TokenPair, AuthError> {
        validation::validate_login(email, password, fingerprint)?;

        let found = with_deadline(self.store_timeout, self.credentials.user_by_email(email)).await;
        let user = match found {
            Ok(user) => user,
            Err(StoreError::UserNotFound) => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD))
                    .await?;
                self.verify_password(password, dummy).await?;
                warn!("login refused: unknown account");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(internal("failed to get user", e)),
        };

        if !self.verify_password(password, &user.password_hash).await? {
            warn!(user_id = user.id, "login refused: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self
            .tokens
            .issue_access_token(user.id, Some(&user.email))
            .map_err(|e| internal("failed to issue access token", e))?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(user.id, fingerprint)
            .await
            .map_err(|e| internal("failed to issue refresh token", e))?;

        info!(user_id = user.id, "user logged in");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a fresh access token. The refresh token
    /// itself stays valid until it expires or the device logs out.
    pub async fn refresh(&self, refresh_token: &str, fingerprint: &str) -> Result<String, AuthError> {
        validation::validate_refresh(refresh_token, fingerprint)?;

        let user_id = match self
            .tokens
            .validate_refresh_token(refresh_token, fingerprint)
            .await
        {
            Ok(user_id) => user_id,
            Err(TokenError::Storage(e)) => {
                return Err(internal("failed to look up refresh session", e));
            }
            Err(e) => {
                warn!(reason = %e, "refresh refused");
                return Err(AuthError::InvalidSession);
            }
        };

        let access_token = self
            .tokens
            .issue_access_token(user_id, None)
            .map_err(|e| internal("failed to issue access token", e))?;

        info!(user_id, "issued access token from refresh session");
        Ok(access_token)
    }

    /// Drop this device's refresh session. The access token proves who is
    /// asking; it stays valid until its own expiry.
    pub async fn logout(&self, access_token: &str, fingerprint: &str) -> Result<(), AuthError> {
        validation::validate_logout(access_token, fingerprint)?;

        let user_id = self.tokens.validate_access_token(access_token).map_err(|e| {
            warn!(reason = %e, "logout refused: access token rejected");
            AuthError::Unauthenticated
        })?;

        self.tokens
            .revoke_session(user_id, fingerprint)
            .await
            .map_err(|e| internal("failed to revoke session", e))?;

        info!(user_id, "user logged out");
        Ok(())
    }

    /// Service-to-service introspection of an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<i64, AuthError> {
        self.tokens.validate_access_token(token).map_err(|e| {
            warn!(reason = %e, "access token rejected");
            AuthError::Unauthenticated
        })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| internal("password hash task failed", e))?
            .map_err(|e| internal("failed to hash password", e))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| internal("password verify task failed", e))?
            .map_err(|e| internal("failed to verify password", e))
    }
}
