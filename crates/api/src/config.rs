//! Application configuration

use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Channel adapter ingestion
    pub ingest_token: String,

    // Core timing windows
    pub typing_ttl: Duration,
    pub presence_window: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            ingest_token: env::var("INGEST_TOKEN")
                .map_err(|_| ConfigError::Missing("INGEST_TOKEN"))?,

            typing_ttl: Duration::from_millis(parse_env("TYPING_TTL_MS", 2000)),
            presence_window: Duration::from_secs(parse_env("PRESENCE_WINDOW_SECS", 45)),
            sweep_interval: Duration::from_secs(parse_env("SWEEP_INTERVAL_SECS", 5)),
        })
    }
}

fn parse_env(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
