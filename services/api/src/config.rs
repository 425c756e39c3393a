//! services/api/src/config.rs
//!
//! Runtime settings of the watch-progress service, read from the process
//! environment. A `.env` file next to the binary is honoured outside tests.

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(String),
    #[error("{0} has an unusable value: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    /// `EnvFilter` directives, e.g. `info` or `api_lib=debug,tower_http=info`.
    pub log_filter: String,
    pub db_max_connections: u32,
    /// The single browser origin allowed to call the API with credentials.
    pub cors_origin: String,
    /// Used when `GET /api/continue-watching` has no `limit`.
    pub continue_watching_limit: usize,
    /// Used when `GET /api/history` has no `limit`.
    pub history_limit: usize,
}

impl Config {
    /// Reads every setting, failing on the first missing or malformed one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        Ok(Self {
            bind_address: parse_var("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            database_url: required_var("DATABASE_URL")?,
            log_filter: log_filter_var("RUST_LOG", "info")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            continue_watching_limit: parse_var("CONTINUE_WATCHING_DEFAULT_LIMIT", 10)?,
            history_limit: parse_var("HISTORY_DEFAULT_LIMIT", 20)?,
        })
    }

    /// Defaults suitable for tests that never touch the network or the database.
    pub fn for_tests() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: String::new(),
            log_filter: "debug".to_string(),
            db_max_connections: 1,
            cors_origin: "http://localhost:3000".to_string(),
            continue_watching_limit: 10,
            history_limit: 20,
        }
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Reads a `tracing` filter, rejecting directives `EnvFilter` cannot parse.
fn log_filter_var(name: &str, default: &str) -> Result<String, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    EnvFilter::try_new(&raw)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e)))?;
    Ok(raw)
}

/// Reads an optional variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a valid value", raw))
        }),
        Err(_) => Ok(default),
    }
}
