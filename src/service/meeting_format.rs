use chrono_tz::Tz;

use crate::models::meeting::Meeting;

const START_FORMAT: &str = "%a %b %-d, %l:%M%P";
const END_FORMAT: &str = "%l:%M%P %Z";
const NO_DESCRIPTION: &str = "_no description provided_";
const SEPARATOR: &str = "------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Soon,
    Now,
}

impl Threshold {
    pub fn headline(self) -> &'static str {
        match self {
            Threshold::Soon => "Your meeting starts soon!",
            Threshold::Now => "Your meeting is starting now!",
        }
    }
}

pub fn meeting_summary(meeting: &Meeting, zone: &Tz) -> String {
    let start = meeting.start.with_timezone(zone);
    let end = meeting.end.with_timezone(zone);
    let description = meeting
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(NO_DESCRIPTION);
    format!(
        "**Title:** {}\n**Time:** {} - {}\n**Description:** {}",
        meeting.title,
        start.format(START_FORMAT),
        end.format(END_FORMAT),
        description
    )
}

pub fn notification_message(threshold: Threshold, meeting: &Meeting, zone: &Tz) -> String {
    format!("{}\n{}", threshold.headline(), meeting_summary(meeting, zone))
}

pub fn meeting_list(meetings: &[Meeting], zone: &Tz) -> String {
    if meetings.is_empty() {
        return "No upcoming meetings found.".to_string();
    }
    let body = meetings
        .iter()
        .map(|m| meeting_summary(m, zone))
        .collect::<Vec<_>>()
        .join(&format!("\n\n{}\n", SEPARATOR));
    format!("{}\n{}", SEPARATOR, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn meeting(description: Option<&str>) -> Meeting {
        Meeting {
            start: Utc.with_ymd_and_hms(2026, 2, 10, 17, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 10, 17, 30, 0).unwrap(),
            title: "Sprint review".to_string(),
            description: description.map(str::to_string),
            attendees: vec![],
        }
    }

    #[test]
    fn summary_uses_destination_timezone() {
        let text = meeting_summary(&meeting(Some("@alice, bob")), &chrono_tz::US::Pacific);
        assert_eq!(
            text,
            "**Title:** Sprint review\n**Time:** Tue Feb 10,  9:00am -  9:30am PST\n**Description:** @alice, bob"
        );
    }

    #[test]
    fn summary_without_description() {
        let text = meeting_summary(&meeting(None), &chrono_tz::UTC);
        assert!(text.ends_with("**Description:** _no description provided_"));
    }

    #[test]
    fn message_starts_with_headline() {
        let text = notification_message(Threshold::Now, &meeting(None), &chrono_tz::UTC);
        assert!(text.starts_with("Your meeting is starting now!\n**Title:** Sprint review"));
    }

    #[test]
    fn empty_list() {
        assert_eq!(meeting_list(&[], &chrono_tz::UTC), "No upcoming meetings found.");
    }
}
