//! Process configuration.
//!
//! Loaded once at startup from a YAML file (`--config`) or, without one, from
//! environment variables. Validated before anything connects.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sso_api::config::ApiConfig;
use sso_core::auth::tokens::TokenConfig;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:44044";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_SSLMODE: &str = "disable";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Deployment environment. Selects the log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Local,
    Dev,
    Prod,
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "prod" => Ok(Env::Prod),
            other => Err(ConfigError::Invalid {
                name: "ENV",
                reason: format!("expected local, dev or prod, got {other:?}"),
            }),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub service_token: String,
}

#[derive(Clone, Deserialize)]
pub struct PostgresConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl PostgresConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let ssl_mode = PgSslMode::from_str(&self.sslmode).map_err(|e| ConfigError::Invalid {
            name: "postgres.sslmode",
            reason: e.to_string(),
        })?;
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
            .ssl_mode(ssl_mode))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct TokensConfig {
    pub secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub env: Env,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub tokens: TokensConfig,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.into()
}

fn default_sslmode() -> String {
    DEFAULT_SSLMODE.into()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.into()
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

impl AppConfig {
    /// Load from `path` if given, otherwise from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Self::from_lookup(|name| std::env::var(name).ok()),
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from environment-style variables resolved through `lookup`.
    ///
    /// | Variable                   | Default                  |
    /// |----------------------------|--------------------------|
    /// | `ENV`                      | `local`                  |
    /// | `BIND_ADDR`                | `0.0.0.0:44044`          |
    /// | `SERVICE_TOKEN`            | required                 |
    /// | `POSTGRES_USER`            | required                 |
    /// | `POSTGRES_PASSWORD`        | required                 |
    /// | `POSTGRES_HOST`            | required                 |
    /// | `POSTGRES_PORT`            | required                 |
    /// | `POSTGRES_DBNAME`          | required                 |
    /// | `POSTGRES_SSLMODE`         | `disable`                |
    /// | `POSTGRES_MAX_CONNECTIONS` | `5`                      |
    /// | `REDIS_URL`                | `redis://127.0.0.1:6379` |
    /// | `TOKENS_SECRET`            | required                 |
    /// | `TOKENS_ACCESS_TTL_SECS`   | required                 |
    /// | `TOKENS_REFRESH_TTL_SECS`  | required                 |
    /// | `STORE_TIMEOUT_MS`         | `5000`                   |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let config = AppConfig {
            env: match vars.optional("ENV") {
                Some(raw) => raw.parse()?,
                None => Env::default(),
            },
            server: ServerConfig {
                bind_addr: vars.optional("BIND_ADDR").unwrap_or_else(default_bind_addr),
                service_token: vars.required("SERVICE_TOKEN")?,
            },
            postgres: PostgresConfig {
                user: vars.required("POSTGRES_USER")?,
                password: vars.required("POSTGRES_PASSWORD")?,
                host: vars.required("POSTGRES_HOST")?,
                port: vars.number("POSTGRES_PORT")?,
                dbname: vars.required("POSTGRES_DBNAME")?,
                sslmode: vars.optional("POSTGRES_SSLMODE").unwrap_or_else(default_sslmode),
                max_connections: vars
                    .number_or("POSTGRES_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            },
            redis: RedisConfig {
                url: vars.optional("REDIS_URL").unwrap_or_else(default_redis_url),
            },
            tokens: TokensConfig {
                secret: vars.required("TOKENS_SECRET")?,
                access_ttl_secs: vars.number("TOKENS_ACCESS_TTL_SECS")?,
                refresh_ttl_secs: vars.number("TOKENS_REFRESH_TTL_SECS")?,
            },
            store_timeout_ms: vars.number_or("STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let non_empty = [
            ("service_token", self.server.service_token.as_str()),
            ("tokens.secret", self.tokens.secret.as_str()),
        ];
        for (name, value) in non_empty {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must not be empty".into(),
                });
            }
        }

        let positive = [
            ("tokens.access_ttl_secs", self.tokens.access_ttl_secs),
            ("tokens.refresh_ttl_secs", self.tokens.refresh_ttl_secs),
            ("store_timeout_ms", self.store_timeout_ms),
            ("postgres.max_connections", u64::from(self.postgres.max_connections)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            bind_addr: self.server.bind_addr.clone(),
            service_token: self.server.service_token.clone(),
        }
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.tokens.secret.clone(),
            access_ttl: Duration::from_secs(self.tokens.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.tokens.refresh_ttl_secs),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn number<T: FromStr>(&self, name: &'static str) -> Result<T, ConfigError> {
        let raw = self.required(name)?;
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw })
    }

    fn number_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(_) => self.number(name),
            None => Ok(default),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("service_token", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl fmt::Debug for TokensConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokensConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}
