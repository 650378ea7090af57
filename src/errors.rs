use thiserror::Error;

/// Why a calendar could not be read for a destination. The destination is
/// skipped for the current tick and retried on the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("calendar rejected credentials: {0}")]
    Unauthorized(String),

    #[error("calendar unreachable: {0}")]
    Unreachable(String),

    #[error("calendar returned malformed data: {0}")]
    MalformedData(String),
}

/// A single attendee could not be messaged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("attendee {0} is not a member of the destination")]
    UnknownAttendee(String),

    #[error("failed to send to {attendee}: {reason}")]
    Send { attendee: String, reason: String },

    #[error("delivery timed out")]
    TimedOut,
}

/// Rejected destination or application settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("reminder time must be between 0 and {max} minutes, got {0}", max = crate::models::destination::MAX_SOON_MINUTES)]
    InvalidThreshold(i64),

    #[error("invalid calendar source: {0}")]
    InvalidSource(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("missing required setting {0}")]
    Missing(String),

    #[error("settings file error: {0}")]
    Io(String),

    #[error("settings file is not valid JSON: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::MalformedData(err.to_string())
        } else {
            SourceError::Unreachable(err.to_string())
        }
    }
}
