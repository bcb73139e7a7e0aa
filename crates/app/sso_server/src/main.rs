//! SSO API server binary.
//!
//! `serve` (the default) runs the HTTP API; `migrate` and `clear` manage the
//! database schema and the session namespace.

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sso_core::auth::password::BcryptHasher;
use sso_core::auth::service::AuthService;
use sso_core::auth::tokens::{KEY_PREFIX, TokenManager};
use sso_core::store::postgres::PgCredentialStore;
use sso_core::store::redis::RedisSessionStore;
use tracing::info;

use crate::config::AppConfig;

/// CLI arguments for the SSO server.
#[derive(Parser, Debug)]
#[command(name = "sso_server", about = "SSO token and session service")]
struct Args {
    /// Path to a YAML config file. Without one, settings come from the
    /// environment (and `.env`).
    #[arg(long, env = "SSO_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the API server.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Drop every session from Redis and revert all migrations.
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    logging::init(config.env);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
        Command::Clear => clear(config).await,
    }
}

async fn connect_pool(config: &AppConfig) -> Result<PgPool, Box<dyn std::error::Error>> {
    info!(
        host = %config.postgres.host,
        dbname = %config.postgres.dbname,
        max_connections = config.postgres.max_connections,
        "connecting to postgres"
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(config.postgres.connect_options()?)
        .await?;
    Ok(pool)
}

async fn connect_sessions(config: &AppConfig) -> Result<RedisSessionStore, Box<dyn std::error::Error>> {
    info!("connecting to redis");
    let sessions = RedisSessionStore::connect(&config.redis.url).await?;
    sessions.ping().await?;
    Ok(sessions)
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(env = ?config.env, version = sso_core::version(), "starting sso_server");

    let pool = connect_pool(&config).await?;
    info!("running database migrations");
    sso_core::migrate::migrate(&pool).await?;

    let sessions = connect_sessions(&config).await?;

    let tokens = TokenManager::new(
        &config.token_config(),
        config.store_timeout(),
        Arc::new(sessions),
    );
    let auth = AuthService::new(
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(BcryptHasher::default()),
        tokens,
        config.store_timeout(),
    );

    let api_config = config.api_config();
    let listener = tokio::net::TcpListener::bind(&api_config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let state = sso_api::AppState {
        auth: Arc::new(auth),
        config: api_config,
    };
    let app = sso_api::router(state);

    info!(addr = %local_addr, "API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("sso_server stopped");
    Ok(())
}

async fn migrate(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect_pool(&config).await?;
    sso_core::migrate::migrate(&pool).await?;
    info!("migrations applied");
    Ok(())
}

async fn clear(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = connect_sessions(&config).await?;
    let removed = sessions.flush_prefix(KEY_PREFIX).await?;
    info!(removed, "cleared session store");

    let pool = connect_pool(&config).await?;
    sso_core::migrate::revert(&pool).await?;
    info!("migrations reverted");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let args = Args::try_parse_from(["sso_server"]).unwrap();
        assert_eq!(args.command, None);
        assert!(args.config.is_none() || std::env::var_os("SSO_CONFIG").is_some());
    }

    #[test]
    fn config_flag_works_after_subcommand() {
        let args = Args::try_parse_from(["sso_server", "migrate", "--config", "sso.yaml"]).unwrap();
        assert_eq!(args.command, Some(Command::Migrate));
        assert_eq!(args.config, Some(PathBuf::from("sso.yaml")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["sso_server", "destroy"]).is_err());
    }
}
