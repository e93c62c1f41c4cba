//! Configuration management for the gateway.
//!
//! All runtime configuration comes from the process environment; missing
//! required variables fail fast at startup.

use std::env;

use crate::error::{Error, Result};
use crate::{DEFAULT_STATUS_PORT, DEFAULT_TCP_PORT};

/// Main configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Fleet API (`FLEET_API_URL`, required).
    pub fleet_api_url: String,

    /// Bearer token shared with the Fleet API (`SHARED_SECRET`, required).
    pub shared_secret: String,

    /// Device-facing TCP listener port (`TCP_PORT`).
    pub tcp_port: u16,

    /// Local status HTTP port (`STATUS_PORT`).
    pub status_port: u16,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Tests inject maps here instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fleet_api_url = get("FLEET_API_URL")
            .ok_or_else(|| Error::Config("FLEET_API_URL is required".into()))?;
        let shared_secret =
            get("SHARED_SECRET").ok_or_else(|| Error::Config("SHARED_SECRET is required".into()))?;

        let config = Self {
            fleet_api_url,
            shared_secret,
            tcp_port: parse_port("TCP_PORT", get("TCP_PORT"), DEFAULT_TCP_PORT)?,
            status_port: parse_port("STATUS_PORT", get("STATUS_PORT"), DEFAULT_STATUS_PORT)?,
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                format: get("LOG_FORMAT").unwrap_or_else(|| "text".into()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.fleet_api_url)
            .map_err(|e| Error::Config(format!("FLEET_API_URL is not an absolute URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "FLEET_API_URL must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.shared_secret.is_empty() {
            return Err(Error::Config("SHARED_SECRET must not be empty".into()));
        }

        if self.tcp_port == self.status_port {
            return Err(Error::Config(format!(
                "TCP_PORT and STATUS_PORT collide on {}",
                self.tcp_port
            )));
        }

        Ok(())
    }

    /// Full URL of the ingest endpoint.
    pub fn ingest_url(&self) -> String {
        format!(
            "{}/api/gps/ingest",
            self.fleet_api_url.trim_end_matches('/')
        )
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

fn parse_port(key: &str, value: Option<String>, default: u16) -> Result<u16> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{key} is not a valid port: {raw:?}"))),
    }
}

/// Initialize the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("failed to init logging: {e}")))?;
    }

    Ok(())
}
