//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;

use crate::AppState;
use crate::error::ApiResult;
use crate::models::{
    AccessTokenRequest, AccessTokenResponse, LoginRequest, LogoutRequest, LogoutResponse,
    RegisterRequest, TokenPairResponse, ValidateRequest, ValidateResponse,
};

/// `POST /v1/auth/register`: create an account and log it in.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<TokenPairResponse>> {
    let Json(body) = body?;
    let pair = state
        .auth
        .register(&body.email, &body.password, &body.fingerprint)
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /v1/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenPairResponse>> {
    let Json(body) = body?;
    let pair = state
        .auth
        .login(&body.email, &body.password, &body.fingerprint)
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /v1/auth/access-token`: exchange a refresh token for an access token.
pub async fn access_token_handler(
    State(state): State<AppState>,
    body: Result<Json<AccessTokenRequest>, JsonRejection>,
) -> ApiResult<Json<AccessTokenResponse>> {
    let Json(body) = body?;
    let access_token = state
        .auth
        .refresh(&body.refresh_token, &body.fingerprint)
        .await?;
    Ok(Json(AccessTokenResponse { access_token }))
}

/// `POST /v1/auth/validate`: resolve an access token to its user id.
pub async fn validate_handler(
    State(state): State<AppState>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> ApiResult<Json<ValidateResponse>> {
    let Json(body) = body?;
    let user_id = state.auth.validate_access_token(&body.access_token)?;
    Ok(Json(ValidateResponse { user_id }))
}

/// `POST /v1/auth/logout`: drop the refresh session for this device.
pub async fn logout_handler(
    State(state): State<AppState>,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> ApiResult<Json<LogoutResponse>> {
    let Json(body) = body?;
    state
        .auth
        .logout(&body.access_token, &body.fingerprint)
        .await?;
    Ok(Json(LogoutResponse {}))
}
