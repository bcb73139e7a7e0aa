//! Service-trust middleware: shared inter-service bearer check.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;

/// Axum middleware: requires `Authorization: Bearer <service token>` on every
/// call. Missing, malformed and mismatched headers are rejected the same way.
pub async fn require_service_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if !is_trusted(presented, &state.config.service_token) {
        warn!(path = %request.uri().path(), "rejected call without service credential");
        return Err(ApiError::Unauthenticated);
    }

    Ok(next.run(request).await)
}

/// Compare fixed-size digests so the check does not short-circuit on the
/// first differing byte of the secret.
fn is_trusted(presented: &[u8], service_token: &str) -> bool {
    let expected = Sha256::digest(format!("Bearer {service_token}").as_bytes());
    let presented = Sha256::digest(presented);
    !service_token.is_empty() && expected == presented
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_bearer_value_is_trusted() {
        assert!(is_trusted(b"Bearer conn-token", "conn-token"));
    }

    #[test]
    fn anything_else_is_not() {
        for presented in [
            &b""[..],
            b"conn-token",
            b"Bearer ",
            b"bearer conn-token",
            b"Bearer conn-token ",
            b"Bearer other",
        ] {
            assert!(!is_trusted(presented, "conn-token"));
        }
    }

    #[test]
    fn empty_service_token_trusts_nobody() {
        assert!(!is_trusted(b"Bearer ", ""));
    }
}
