//! Configuration types.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    /// Optional webhook for tenant notifications; falls back to logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifier: Option<NotifierConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bumper.db")
}

/// External promotion site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on candidate-listing pages fetched per account.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    20
}

/// Notification webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: String,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

fn default_notifier_timeout() -> u64 {
    10
}

/// Config view safe to expose over the API: no webhook URL.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database_path: PathBuf,
    pub upstream_base_url: String,
    pub notifier_configured: bool,
    pub engine: EngineConfig,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database_path: config.database.path.clone(),
            upstream_base_url: config.upstream.base_url.clone(),
            notifier_configured: config.notifier.is_some(),
            engine: config.engine.clone(),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
