//! # sso_api
//!
//! HTTP API library for SSO.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;
use sso_core::auth::service::AuthService;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Auth orchestrator.
    pub auth: Arc<AuthService>,
    /// API configuration.
    pub config: ApiConfig,
}

/// Builds the Axum router with all routes and shared state.
///
/// Every route sits behind the service-trust check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_ACCESS_TOKEN, post(auth::access_token_handler))
        .route(routes::POST_AUTH_VALIDATE, post(auth::validate_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::service_trust::require_service_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
