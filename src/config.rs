use std::collections::HashMap;
use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "./data/meetingreminders/settings.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETENTION_MINUTES: i64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// `KEY=VALUE` configuration with environment fallback for keys missing from
/// the file.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidValue {
                    key: format!("line {}", idx + 1),
                    value: line.to_string(),
                });
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    /// Loads `CONFIG_FILE` when set, otherwise an empty config that defers to
    /// the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
    }

    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    pub fn settings_file(&self) -> String {
        self.get("SETTINGS_FILE")
            .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string())
    }

    pub fn scheduler_options(&self) -> Result<SchedulerOptions, ConfigError> {
        Ok(SchedulerOptions {
            poll_interval: Duration::from_secs(
                self.get_or("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            ),
            retention: self.retention()?,
            fetch_timeout: Duration::from_secs(
                self.get_or("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
            ),
            delivery_timeout: Duration::from_secs(
                self.get_or("DELIVERY_TIMEOUT_SECS", DEFAULT_DELIVERY_TIMEOUT_SECS)?,
            ),
        })
    }

    fn retention(&self) -> Result<chrono::Duration, ConfigError> {
        let minutes: i64 = self.get_or("RETENTION_MINUTES", DEFAULT_RETENTION_MINUTES)?;
        Some(minutes)
            .filter(|m| *m >= 0)
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "RETENTION_MINUTES".to_string(),
                value: minutes.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    /// How long after a meeting's start its notification state is kept.
    pub retention: chrono::Duration,
    pub fetch_timeout: Duration,
    pub delivery_timeout: Duration,
}

impl SchedulerOptions {
    /// Oldest meeting start still tracked at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            retention: chrono::Duration::minutes(DEFAULT_RETENTION_MINUTES),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            delivery_timeout: Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let config = AppConfig::parse(
            "# bot settings\nexport DISCORD_TOKEN=\"abc\"\nPOLL_INTERVAL_SECS = 15\n\nSETTINGS_FILE='/tmp/s.json'\n",
        )
        .unwrap();
        assert_eq!(config.get("DISCORD_TOKEN").as_deref(), Some("abc"));
        assert_eq!(config.settings_file(), "/tmp/s.json");
        let options = config.scheduler_options().unwrap();
        assert_eq!(options.poll_interval, Duration::from_secs(15));
        assert_eq!(options.retention, chrono::Duration::minutes(60));
    }

    #[test]
    fn rejects_malformed_lines_and_values() {
        assert!(AppConfig::parse("NOT A PAIR").is_err());
        let config = AppConfig::parse("RETENTION_MINUTES=soon").unwrap();
        assert_eq!(
            config.scheduler_options(),
            Err(ConfigError::InvalidValue {
                key: "RETENTION_MINUTES".to_string(),
                value: "soon".to_string(),
            })
        );
    }

    #[test]
    fn retention_must_fit_a_duration() {
        let config = AppConfig::parse("RETENTION_MINUTES=9999999999999999").unwrap();
        assert_eq!(
            config.scheduler_options(),
            Err(ConfigError::InvalidValue {
                key: "RETENTION_MINUTES".to_string(),
                value: "9999999999999999".to_string(),
            })
        );
        assert!(AppConfig::parse("RETENTION_MINUTES=-5")
            .unwrap()
            .scheduler_options()
            .is_err());

        // Valid as a duration but reaching past the calendar's range.
        let options = AppConfig::parse("RETENTION_MINUTES=100000000000000")
            .unwrap()
            .scheduler_options()
            .unwrap();
        assert_eq!(options.cutoff(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }
}
