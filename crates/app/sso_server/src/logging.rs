//! Tracing subscriber setup, chosen by deployment environment.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

const DEBUG_FILTER: &str = "info,sso_server=debug,sso_api=debug,sso_core=debug,tower_http=debug";
const PROD_FILTER: &str = "info";

/// Default filter for `env` when `RUST_LOG` is unset.
pub fn default_filter(env: Env) -> &'static str {
    match env {
        Env::Local | Env::Dev => DEBUG_FILTER,
        Env::Prod => PROD_FILTER,
    }
}

/// Install the global subscriber. Logs go to stderr: text for `local`,
/// JSON otherwise.
pub fn init(env: Env) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    let registry = tracing_subscriber::registry().with(filter);
    match env {
        Env::Local => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        Env::Dev | Env::Prod => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
