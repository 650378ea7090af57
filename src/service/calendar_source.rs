use chrono::{DateTime, Utc};
use serenity::async_trait;

use crate::clients::google_calendar::GoogleCalendarSource;
use crate::clients::ics_feed::IcsFeedSource;
use crate::errors::SourceError;
use crate::models::destination::{CalendarLocator, DestinationConfig};
use crate::models::meeting::Meeting;

/// Number of upcoming meetings pulled per destination.
pub const MAX_MEETINGS: usize = 5;

#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Upcoming meetings for a destination, ordered by start. Meetings that
    /// started before `since` are left out.
    async fn fetch(
        &self,
        destination: &str,
        config: &DestinationConfig,
        since: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SourceError>;
}

/// Picks the Google or feed client from the destination's locator.
pub struct LocatorSource {
    google: GoogleCalendarSource,
    ics: IcsFeedSource,
}

impl LocatorSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            google: GoogleCalendarSource::new(http.clone()),
            ics: IcsFeedSource::new(http),
        }
    }
}

#[async_trait]
impl CalendarSource for LocatorSource {
    async fn fetch(
        &self,
        destination: &str,
        config: &DestinationConfig,
        since: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SourceError> {
        match &config.source {
            CalendarLocator::Google { .. } => self.google.fetch(destination, config, since).await,
            CalendarLocator::IcsFeed { .. } => self.ics.fetch(destination, config, since).await,
        }
    }
}
