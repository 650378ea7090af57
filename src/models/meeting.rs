use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Meeting {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub attendees: Vec<String>,
}

/// Identity of a meeting for notification bookkeeping. Calendar sources give
/// no stable id, so a later fetch of the same event must produce an equal key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeetingKey {
    pub destination: String,
    pub start: DateTime<Utc>,
    pub title: String,
}

impl Meeting {
    pub fn key(&self, destination: &str) -> MeetingKey {
        MeetingKey {
            destination: destination.to_string(),
            start: self.start,
            title: self.title.clone(),
        }
    }
}

// Attendees are listed on the first line of the description, e.g.
// "@alice, bob, @carol".
pub fn attendees_from_description(description: Option<&str>) -> Vec<String> {
    let Some(first_line) = description.and_then(|d| d.lines().next()) else {
        return Vec::new();
    };
    first_line
        .split(',')
        .map(|user| user.trim_matches(|c: char| c == '@' || c == ' ').to_string())
        .filter(|user| !user.is_empty())
        .collect()
}
