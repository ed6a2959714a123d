//! Service configuration: TOML file with environment overrides.

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_str};
pub use types::{
    Config, ConfigError, DatabaseConfig, NotifierConfig, SanitizedConfig, ServerConfig,
    UpstreamConfig,
};
pub use validate::validate_config;
