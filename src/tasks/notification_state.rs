use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::meeting::{Meeting, MeetingKey};
use crate::service::meeting_format::Threshold;

/// Which meetings of one destination have already been announced, plus the
/// meetings seen on the last successful fetch.
#[derive(Debug, Default, Clone)]
pub struct NotificationState {
    soon_notified: HashSet<MeetingKey>,
    now_notified: HashSet<MeetingKey>,
    meetings: Vec<Meeting>,
}

impl NotificationState {
    /// Decides whether `meeting` crosses a threshold it has not been announced
    /// for yet, and records it. At most one threshold fires per call. A
    /// meeting that has started only ever gets the "now" notification.
    pub fn evaluate(
        &mut self,
        destination: &str,
        meeting: &Meeting,
        soon: Duration,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Option<Threshold> {
        // Past the retention window the key would be pruned straight away and
        // the meeting announced again on the next fetch.
        if meeting.start < cutoff {
            return None;
        }
        let key = meeting.key(destination);
        if meeting.start <= now {
            return self.now_notified.insert(key).then_some(Threshold::Now);
        }
        // A window reaching past the representable range covers every meeting.
        let within_soon = now
            .checked_add_signed(soon)
            .is_none_or(|horizon| meeting.start < horizon);
        if soon > Duration::zero() && within_soon {
            return self.soon_notified.insert(key).then_some(Threshold::Soon);
        }
        None
    }

    /// Forgets every meeting that started before `cutoff`.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.soon_notified.retain(|key| key.start >= cutoff);
        self.now_notified.retain(|key| key.start >= cutoff);
    }

    pub fn was_notified(&self, key: &MeetingKey, threshold: Threshold) -> bool {
        match threshold {
            Threshold::Soon => self.soon_notified.contains(key),
            Threshold::Now => self.now_notified.contains(key),
        }
    }

    pub fn tracked(&self) -> usize {
        self.soon_notified.len() + self.now_notified.len()
    }

    pub fn meetings(&self) -> &[Meeting] {
        &self.meetings
    }

    pub fn set_meetings(&mut self, meetings: Vec<Meeting>) {
        self.meetings = meetings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()
    }

    fn meeting_at(start: DateTime<Utc>) -> Meeting {
        Meeting {
            start,
            end: start + Duration::minutes(30),
            title: "1:1".to_string(),
            description: None,
            attendees: vec!["alice".to_string()],
        }
    }

    fn cutoff() -> DateTime<Utc> {
        now() - Duration::hours(1)
    }

    #[test]
    fn soon_then_now_each_fire_once() {
        let mut state = NotificationState::default();
        let meeting = meeting_at(now() + Duration::minutes(45));
        let soon = Duration::minutes(60);

        assert_eq!(state.evaluate("g", &meeting, soon, now(), cutoff()), Some(Threshold::Soon));
        assert_eq!(state.evaluate("g", &meeting, soon, now(), cutoff()), None);

        let later = now() + Duration::minutes(46);
        assert_eq!(
            state.evaluate("g", &meeting, soon, later, later - Duration::hours(1)),
            Some(Threshold::Now)
        );
        assert_eq!(state.evaluate("g", &meeting, soon, later, later - Duration::hours(1)), None);
    }

    #[test]
    fn zero_soon_only_fires_now() {
        let mut state = NotificationState::default();
        let meeting = meeting_at(now() + Duration::minutes(1));
        assert_eq!(state.evaluate("g", &meeting, Duration::zero(), now(), cutoff()), None);

        let at_start = meeting.start;
        assert_eq!(
            state.evaluate("g", &meeting, Duration::zero(), at_start, cutoff()),
            Some(Threshold::Now)
        );
        assert!(!state.was_notified(&meeting.key("g"), Threshold::Soon));
    }

    #[test]
    fn started_meeting_is_never_soon() {
        let mut state = NotificationState::default();
        let meeting = meeting_at(now() - Duration::seconds(10));
        assert_eq!(
            state.evaluate("g", &meeting, Duration::minutes(60), now(), cutoff()),
            Some(Threshold::Now)
        );
        assert!(!state.was_notified(&meeting.key("g"), Threshold::Soon));
    }

    #[test]
    fn prune_uses_each_entry_start() {
        let mut state = NotificationState::default();
        let old = meeting_at(now() - Duration::minutes(50));
        let fresh = meeting_at(now() + Duration::minutes(5));
        state.evaluate("g", &old, Duration::minutes(10), now(), cutoff());
        state.evaluate("g", &fresh, Duration::minutes(10), now(), cutoff());
        assert_eq!(state.tracked(), 2);

        state.prune(now() + Duration::minutes(15) - Duration::hours(1));
        assert!(!state.was_notified(&old.key("g"), Threshold::Now));
        assert!(state.was_notified(&fresh.key("g"), Threshold::Soon));
        assert_eq!(state.tracked(), 1);
    }

    #[test]
    fn unbounded_soon_window_does_not_overflow() {
        let mut state = NotificationState::default();
        let meeting = meeting_at(now() + Duration::days(300));
        assert_eq!(
            state.evaluate("g", &meeting, Duration::MAX, now(), cutoff()),
            Some(Threshold::Soon)
        );
    }

    #[test]
    fn meetings_older_than_retention_are_ignored() {
        let mut state = NotificationState::default();
        let ancient = meeting_at(now() - Duration::hours(2));
        assert_eq!(state.evaluate("g", &ancient, Duration::minutes(10), now(), cutoff()), None);
        assert_eq!(state.tracked(), 0);
    }
}
