use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ical::IcalParser;
use ical::property::Property;
use serenity::async_trait;
use tracing::{debug, warn};

use crate::errors::SourceError;
use crate::models::destination::{CalendarLocator, DestinationConfig};
use crate::models::meeting::{Meeting, attendees_from_description};
use crate::service::calendar_source::{CalendarSource, MAX_MEETINGS};

const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Reads meetings from an iCalendar feed URL.
pub struct IcsFeedSource {
    http: reqwest::Client,
}

impl IcsFeedSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CalendarSource for IcsFeedSource {
    async fn fetch(
        &self,
        destination: &str,
        config: &DestinationConfig,
        since: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SourceError> {
        let CalendarLocator::IcsFeed { url } = &config.source else {
            return Err(SourceError::MalformedData(
                "destination is not configured for an ics feed".to_string(),
            ));
        };
        debug!(destination, url = %url, "fetching ics feed");
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized(format!("feed returned {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Unreachable(format!("feed returned {}", status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        parse_feed(&body, &config.timezone, since)
    }
}

/// Upcoming timed events of a feed, ordered by start. Floating times are read
/// in `zone`; all-day events are not meetings and are skipped.
pub fn parse_feed(
    body: &str,
    zone: &Tz,
    since: DateTime<Utc>,
) -> Result<Vec<Meeting>, SourceError> {
    let mut meetings = Vec::new();
    for calendar in IcalParser::new(body.as_bytes()) {
        let calendar = calendar.map_err(|e| SourceError::MalformedData(e.to_string()))?;
        for event in calendar.events {
            let Some(dtstart) = find(&event.properties, "DTSTART") else {
                continue;
            };
            let Some(start) = parse_time(dtstart, zone)? else {
                continue;
            };
            if start < since {
                continue;
            }
            let end = match find(&event.properties, "DTEND") {
                Some(dtend) => parse_time(dtend, zone)?.unwrap_or(start),
                None => start,
            };
            let description = find(&event.properties, "DESCRIPTION")
                .and_then(|p| p.value.as_deref())
                .map(unescape);
            let title = find(&event.properties, "SUMMARY")
                .and_then(|p| p.value.as_deref())
                .map(unescape)
                .unwrap_or_default();
            meetings.push(Meeting {
                start,
                end,
                title,
                attendees: attendees_from_description(description.as_deref()),
                description,
            });
        }
    }
    meetings.sort_by_key(|m| m.start);
    meetings.truncate(MAX_MEETINGS);
    Ok(meetings)
}

fn find<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn parse_time(property: &Property, zone: &Tz) -> Result<Option<DateTime<Utc>>, SourceError> {
    let value = property.value.as_deref().unwrap_or("").trim();
    if param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE")) || value.len() == 8 {
        return Ok(None);
    }
    let malformed = || SourceError::MalformedData(format!("bad {} value: {}", property.name, value));

    if value.ends_with('Z') {
        let naive = NaiveDateTime::parse_from_str(value, UTC_FORMAT).map_err(|_| malformed())?;
        return Ok(Some(Utc.from_utc_datetime(&naive)));
    }
    let naive = NaiveDateTime::parse_from_str(value, LOCAL_FORMAT).map_err(|_| malformed())?;
    let local_zone = match param(property, "TZID") {
        Some(tzid) => tzid.parse::<Tz>().unwrap_or_else(|_| {
            warn!(tzid, fallback = %zone, "unknown TZID, reading time in the destination timezone");
            *zone
        }),
        None => *zone,
    };
    local_zone
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| Some(t.with_timezone(&Utc)))
        .ok_or_else(malformed)
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
