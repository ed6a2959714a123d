//! Engine configuration.

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Orchestration defaults and the optional auto-start window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Daily cap applied to newly registered tenants.
    #[serde(default = "default_daily_cap")]
    pub default_daily_cap: u32,
    /// Active weekdays, 1 = Monday through 7 = Sunday. Applies to
    /// scheduled-stop and auto-start timers. None means every day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<AutoStartConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_daily_cap: default_daily_cap(),
            weekdays: None,
            auto_start: None,
        }
    }
}

fn default_daily_cap() -> u32 {
    100
}

/// Window during which promotion cycles are started automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoStartConfig {
    /// First day of the repeat window, YYYY-MM-DD.
    pub start_date: String,
    /// Window length in days from `start_date`.
    pub repeat_days: u32,
    /// When the auto-start timer fires, HH:MM.
    pub time: String,
    /// Stop time handed to the started cycle, HH:MM.
    pub stop_time: String,
}

static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").unwrap());

/// Parse an HH:MM clock string.
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(s)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_time_valid() {
        assert_eq!(
            parse_clock_time("09:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(parse_clock_time("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
        assert_eq!(parse_clock_time("0:05"), NaiveTime::from_hms_opt(0, 5, 0));
    }

    #[test]
    fn test_parse_clock_time_invalid() {
        assert_eq!(parse_clock_time("24:00"), None);
        assert_eq!(parse_clock_time("12:60"), None);
        assert_eq!(parse_clock_time("noon"), None);
        assert_eq!(parse_clock_time("12:00:00"), None);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_daily_cap, 100);
        assert!(config.weekdays.is_none());
        assert!(config.auto_start.is_none());
    }
}
