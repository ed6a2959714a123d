//! Configuration validation.

use chrono::NaiveDate;

use super::{Config, ConfigError};
use crate::engine::parse_clock_time;

/// Validate a loaded configuration beyond what serde can express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !config.upstream.base_url.starts_with("http://")
        && !config.upstream.base_url.starts_with("https://")
    {
        return Err(ConfigError::Invalid(format!(
            "upstream.base_url must be an http(s) URL, got {:?}",
            config.upstream.base_url
        )));
    }

    if config.upstream.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "upstream.timeout_secs must be positive".to_string(),
        ));
    }

    if config.engine.default_daily_cap == 0 {
        return Err(ConfigError::Invalid(
            "engine.default_daily_cap must be positive".to_string(),
        ));
    }

    if let Some(weekdays) = &config.engine.weekdays {
        // An empty list would leave the daily timers with no valid day.
        if weekdays.is_empty() {
            return Err(ConfigError::Invalid(
                "engine.weekdays must list at least one day, or be omitted".to_string(),
            ));
        }
        if weekdays.iter().any(|d| !(1..=7).contains(d)) {
            return Err(ConfigError::Invalid(
                "engine.weekdays entries must be 1 (Monday) through 7 (Sunday)".to_string(),
            ));
        }
    }

    if let Some(auto_start) = &config.engine.auto_start {
        if NaiveDate::parse_from_str(&auto_start.start_date, "%Y-%m-%d").is_err() {
            return Err(ConfigError::Invalid(format!(
                "engine.auto_start.start_date must be YYYY-MM-DD, got {:?}",
                auto_start.start_date
            )));
        }
        for (field, value) in [
            ("time", &auto_start.time),
            ("stop_time", &auto_start.stop_time),
        ] {
            if parse_clock_time(value).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "engine.auto_start.{} must be HH:MM, got {:?}",
                    field, value
                )));
            }
        }
        if auto_start.repeat_days == 0 {
            return Err(ConfigError::Invalid(
                "engine.auto_start.repeat_days must be positive".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[upstream]
base_url = "https://example.com/api"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = base_config();
        config.upstream.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_weekday_rejected() {
        let mut config = base_config();
        config.engine.weekdays = Some(vec![1, 8]);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_empty_weekdays_rejected() {
        let mut config = base_config();
        config.engine.weekdays = Some(vec![]);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_auto_start_validation() {
        let config = load_config_from_str(
            r#"
[upstream]
base_url = "https://example.com/api"

[engine.auto_start]
start_date = "2026-09-01"
repeat_days = 14
time = "09:00"
stop_time = "21:30"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_ok());

        let bad = load_config_from_str(
            r#"
[upstream]
base_url = "https://example.com/api"

[engine.auto_start]
start_date = "2026-09-01"
repeat_days = 14
time = "25:00"
stop_time = "21:30"
"#,
        )
        .unwrap();
        assert!(matches!(
            validate_config(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }
}
