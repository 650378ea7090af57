use std::fs;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serenity::async_trait;
use tracing::debug;

use crate::errors::SourceError;
use crate::models::destination::{CalendarLocator, DestinationConfig};
use crate::models::meeting::{Meeting, attendees_from_description};
use crate::service::calendar_source::{CalendarSource, MAX_MEETINGS};

const EVENTS_URL: &str = "https://www.googleapis.com/calendar/v3/calendars";

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<Utc>>,
}

/// Google Calendar API v3 client. The bearer token is read from the
/// destination's token file on every fetch so it can be rotated externally.
pub struct GoogleCalendarSource {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, EVENTS_URL)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `{base}/{calendar_id}/events` with the id escaped as a single path
    /// segment. Shared calendar ids contain `#` and `@`.
    fn events_url(&self, calendar_id: &str) -> Result<reqwest::Url, SourceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SourceError::Unreachable(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Unreachable(format!("{} is not a base url", self.base_url)))?
            .pop_if_empty()
            .push(calendar_id)
            .push("events");
        Ok(url)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    async fn fetch(
        &self,
        destination: &str,
        config: &DestinationConfig,
        since: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SourceError> {
        let CalendarLocator::Google {
            calendar_id,
            token_file,
        } = &config.source
        else {
            return Err(SourceError::MalformedData(
                "destination is not configured for Google Calendar".to_string(),
            ));
        };
        let token_file = token_file.as_deref().ok_or_else(|| {
            SourceError::Unauthorized("no credentials configured for this destination".to_string())
        })?;
        let token = fs::read_to_string(token_file)
            .map_err(|e| SourceError::Unauthorized(format!("{}: {}", token_file, e)))?;

        debug!(destination, calendar_id = %calendar_id, "fetching google calendar");
        let max_results = MAX_MEETINGS.to_string();
        let time_min = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let resp = self
            .http
            .get(self.events_url(calendar_id)?)
            .bearer_auth(token.trim())
            .query(&[
                ("timeMin", time_min.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized(format!("google returned {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("google returned {}", status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        parse_events(&body)
    }
}

pub fn parse_events(body: &str) -> Result<Vec<Meeting>, SourceError> {
    let response: EventsResponse =
        serde_json::from_str(body).map_err(|e| SourceError::MalformedData(e.to_string()))?;
    let mut meetings: Vec<Meeting> = response
        .items
        .into_iter()
        .filter(|event| event.status.as_deref() != Some("cancelled"))
        .filter_map(|event| {
            // All-day events carry `date` instead of `dateTime`.
            let start = event.start.and_then(|t| t.date_time)?;
            let end = event.end.and_then(|t| t.date_time).unwrap_or(start);
            let attendees = attendees_from_description(event.description.as_deref());
            Some(Meeting {
                start,
                end,
                title: event.summary.unwrap_or_default(),
                description: event.description,
                attendees,
            })
        })
        .collect();
    meetings.sort_by_key(|m| m.start);
    Ok(meetings)
}
