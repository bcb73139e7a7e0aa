//! API server configuration.

use std::fmt;

/// Configuration for the API surface.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "0.0.0.0:44044").
    pub bind_addr: String,
    /// Shared secret trusted callers present as `Bearer <token>`.
    pub service_token: String,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("service_token", &"<redacted>")
            .finish()
    }
}
