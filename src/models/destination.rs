use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_TIMEZONE: &str = "US/Eastern";
pub const DEFAULT_SOON_MINUTES: i64 = 60;
/// One week.
pub const MAX_SOON_MINUTES: i64 = 7 * 24 * 60;

/// Where a destination's meetings come from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarLocator {
    Google {
        calendar_id: String,
        /// File holding a bearer token for the Calendar API.
        token_file: Option<String>,
    },
    IcsFeed {
        url: String,
    },
}

impl Default for CalendarLocator {
    fn default() -> Self {
        CalendarLocator::Google {
            calendar_id: "primary".to_string(),
            token_file: None,
        }
    }
}

/// Destination settings as stored on disk.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DestinationSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_soon_minutes")]
    pub soon_minutes: i64,
    #[serde(default)]
    pub source: CalendarLocator,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_soon_minutes() -> i64 {
    DEFAULT_SOON_MINUTES
}

impl Default for DestinationSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            soon_minutes: default_soon_minutes(),
            source: CalendarLocator::default(),
        }
    }
}

/// Validated destination settings. This is the only form the scheduler sees.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationConfig {
    pub timezone: Tz,
    pub soon: Duration,
    pub source: CalendarLocator,
}

pub fn parse_timezone(zone: &str) -> Result<Tz, ConfigError> {
    zone.parse::<Tz>()
        .map_err(|_| ConfigError::InvalidTimezone(zone.to_string()))
}

pub fn validate_soon_minutes(minutes: i64) -> Result<Duration, ConfigError> {
    if !(0..=MAX_SOON_MINUTES).contains(&minutes) {
        return Err(ConfigError::InvalidThreshold(minutes));
    }
    Duration::try_minutes(minutes).ok_or(ConfigError::InvalidThreshold(minutes))
}

pub fn validate_source(source: &CalendarLocator) -> Result<(), ConfigError> {
    match source {
        CalendarLocator::Google { calendar_id, .. } if calendar_id.trim().is_empty() => Err(
            ConfigError::InvalidSource("google calendar id is empty".to_string()),
        ),
        CalendarLocator::IcsFeed { url }
            if !(url.starts_with("http://") || url.starts_with("https://")) =>
        {
            Err(ConfigError::InvalidSource(format!(
                "feed url must be http(s): {}",
                url
            )))
        }
        _ => Ok(()),
    }
}

impl TryFrom<&DestinationSettings> for DestinationConfig {
    type Error = ConfigError;

    fn try_from(settings: &DestinationSettings) -> Result<Self, Self::Error> {
        validate_source(&settings.source)?;
        Ok(Self {
            timezone: parse_timezone(&settings.timezone)?,
            soon: validate_soon_minutes(settings.soon_minutes)?,
            source: settings.source.clone(),
        })
    }
}
