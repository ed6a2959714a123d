//! Configuration loading: a TOML file with `BUMPER_` environment
//! overrides layered on top.

use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;

use super::{types::Config, ConfigError};

/// Read the config file at `path`, then apply environment overrides.
/// `BUMPER_SERVER_PORT=9000` overrides `port` in the `[server]` table.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    layered(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn layered(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("BUMPER_").split("_"))
}

/// Parse a config straight from a TOML string, without the environment
/// layer. Intended for tests.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_str_config_parses() {
        let config = load_config_from_str(
            r#"
[server]
port = 9000

[upstream]
base_url = "https://example.com/api"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_upstream_section_is_required() {
        let err = load_config_from_str("[server]\nport = 8080\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_file_config_loads() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[upstream]
base_url = "https://example.com/api"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }
}
