//! # sso_core
//!
//! Core domain logic for SSO: the token lifecycle manager, the auth
//! orchestrator, and the storage seams they run over.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
