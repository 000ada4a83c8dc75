//! Notification filtering and do-not-disturb policy.

/// Marker in the remote id of group summary notifications.
pub const GROUP_SUMMARY_MARKER: &str = "GroupSummary";

/// Marker in the remote id of aggregated SMS thread notifications.
pub const SMS_THREAD_MARKER: &str = ":sms|";

/// Why a notification is filtered out before tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Summary of a notification group.
    GroupSummary,
    /// Aggregate of an SMS thread, already covered by the individual messages.
    SmsThread,
}

impl Suppression {
    /// Classify a remote notification id. `None` means it may be tracked.
    pub fn for_remote_id(remote_id: &str) -> Option<Self> {
        if remote_id.contains(GROUP_SUMMARY_MARKER) {
            Some(Suppression::GroupSummary)
        } else if remote_id.contains(SMS_THREAD_MARKER) {
            Some(Suppression::SmsThread)
        } else {
            None
        }
    }
}

/// A do-not-disturb window ending at a unix timestamp (seconds).
///
/// While active, incoming notifications are still tracked but not shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoNotDisturb {
    until: Option<i64>,
}

impl DoNotDisturb {
    /// Window ending at `until`; `None` disables it.
    pub fn new(until: Option<i64>) -> Self {
        Self { until }
    }

    /// End of the window, if one is set.
    pub fn until(&self) -> Option<i64> {
        self.until
    }

    /// Whether presentation is suppressed at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        matches!(self.until, Some(until) if until > now)
    }

    /// Replace the window. Returns true when the change leaves it inactive,
    /// which is when missed notifications should be requested again.
    pub fn set(&mut self, until: Option<i64>, now: i64) -> bool {
        let changed = self.until != until;
        self.until = until;
        changed && !self.is_active(now)
    }

    /// Clear an elapsed window. Returns true exactly once per expiry.
    pub fn expire(&mut self, now: i64) -> bool {
        match self.until {
            Some(until) if until <= now => {
                self.until = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_summaries_are_suppressed() {
        assert_eq!(
            Suppression::for_remote_id("0|com.mail|GroupSummary|ranker"),
            Some(Suppression::GroupSummary)
        );
    }

    #[test]
    fn sms_threads_are_suppressed() {
        assert_eq!(
            Suppression::for_remote_id("0|com.android.messaging:sms|17"),
            Some(Suppression::SmsThread)
        );
    }

    #[test]
    fn ordinary_ids_pass() {
        assert_eq!(Suppression::for_remote_id("42"), None);
        // a single sms message is shown; only the aggregate is dropped
        assert_eq!(Suppression::for_remote_id("0|sms|3"), None);
    }

    #[test]
    fn dnd_active_until_deadline() {
        let dnd = DoNotDisturb::new(Some(100));
        assert!(dnd.is_active(99));
        assert!(!dnd.is_active(100));
        assert!(!DoNotDisturb::default().is_active(0));
    }

    #[test]
    fn setting_a_past_deadline_requests_refresh() {
        let mut dnd = DoNotDisturb::new(Some(500));
        assert!(dnd.set(Some(10), 100));
        assert!(!dnd.set(Some(10), 100));
    }

    #[test]
    fn extending_window_does_not_request_refresh() {
        let mut dnd = DoNotDisturb::default();
        assert!(!dnd.set(Some(1000), 100));
        assert!(dnd.is_active(100));
    }

    #[test]
    fn disabling_requests_refresh() {
        let mut dnd = DoNotDisturb::new(Some(1000));
        assert!(dnd.set(None, 100));
    }

    #[test]
    fn expiry_fires_once() {
        let mut dnd = DoNotDisturb::new(Some(100));
        assert!(!dnd.expire(50));
        assert!(dnd.expire(100));
        assert!(!dnd.expire(200));
        assert_eq!(dnd.until(), None);
    }
}
