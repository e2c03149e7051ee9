//! Tag records and the two-state presence machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Presence state of a tag.
///
/// A tag is either absent, or present with the time it was last reported.
/// There is no third state, so "arrived" and "left" transitions can only
/// alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresenceState {
    Absent,
    Present { last_seen: DateTime<Utc> },
}

impl PresenceState {
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    #[must_use]
    pub const fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Absent => None,
            Self::Present { last_seen } => Some(*last_seen),
        }
    }
}

impl Default for PresenceState {
    fn default() -> Self {
        Self::Absent
    }
}

/// Outcome of applying a stimulus to a single tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Tag id is not in the registry.
    Ignored,
    /// ABSENT -> PRESENT. A notification is owed.
    Arrived,
    /// PRESENT -> PRESENT. Only `last_seen` moved.
    Refreshed,
    /// PRESENT -> ABSENT after the timeout elapsed. A notification is owed.
    Left,
}

impl TransitionKind {
    /// Returns true if this transition must produce a notification.
    #[must_use]
    pub const fn is_notifiable(&self) -> bool {
        matches!(self, Self::Arrived | Self::Left)
    }
}

/// A trackable tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    id: String,
    display_name: String,
    state: PresenceState,
}

impl Tag {
    /// Creates a tag in the ABSENT state.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            state: PresenceState::Absent,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub const fn state(&self) -> PresenceState {
        self.state
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.state.is_present()
    }

    #[must_use]
    pub const fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.last_seen()
    }

    /// Records a sighting at `now`.
    pub(crate) fn mark_seen(&mut self, now: DateTime<Utc>) -> TransitionKind {
        let kind = if self.state.is_present() {
            TransitionKind::Refreshed
        } else {
            TransitionKind::Arrived
        };
        self.state = PresenceState::Present { last_seen: now };
        kind
    }

    /// Demotes the tag to ABSENT if it has been unseen for at least `timeout`.
    ///
    /// The boundary is inclusive: `now - last_seen == timeout` times out.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>, timeout: Duration) -> Option<TransitionKind> {
        let last_seen = self.state.last_seen()?;
        if now - last_seen >= timeout {
            self.state = PresenceState::Absent;
            Some(TransitionKind::Left)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    #[test]
    fn new_tag_is_absent() {
        let tag = Tag::new("A1B2", "front-door");
        assert_eq!(tag.state(), PresenceState::Absent);
        assert!(tag.last_seen().is_none());
    }

    #[test]
    fn mark_seen_arrives_then_refreshes() {
        let mut tag = Tag::new("A1B2", "front-door");
        assert_eq!(tag.mark_seen(t(0)), TransitionKind::Arrived);
        assert_eq!(tag.mark_seen(t(5)), TransitionKind::Refreshed);
        assert_eq!(tag.last_seen(), Some(t(5)));
    }

    #[test]
    fn expire_is_boundary_inclusive() {
        let mut tag = Tag::new("A1B2", "front-door");
        tag.mark_seen(t(0));
        assert_eq!(tag.expire(t(29), Duration::seconds(30)), None);
        assert_eq!(tag.expire(t(30), Duration::seconds(30)), Some(TransitionKind::Left));
        assert!(!tag.is_present());
    }

    #[test]
    fn expire_on_absent_tag_is_noop() {
        let mut tag = Tag::new("A1B2", "front-door");
        assert_eq!(tag.expire(t(1000), Duration::seconds(30)), None);
    }

    #[test]
    fn presence_state_serializes_tagged() {
        let json = serde_json::to_value(PresenceState::Absent).unwrap();
        assert_eq!(json, serde_json::json!({"state": "absent"}));
    }
}
