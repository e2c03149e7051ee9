//! Notification records and the `Notifier` boundary.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::tag::TransitionKind;

/// Which edge of the presence machine a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Arrived,
    Left,
}

impl NotificationKind {
    /// Maps a transition to the notification it owes, if any.
    #[must_use]
    pub const fn from_transition(kind: TransitionKind) -> Option<Self> {
        match kind {
            TransitionKind::Arrived => Some(Self::Arrived),
            TransitionKind::Left => Some(Self::Left),
            TransitionKind::Ignored | TransitionKind::Refreshed => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Arrived => "arrived",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound "state changed" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub tag_id: String,
    pub tag_name: String,
    /// Detector that reported the arrival. Always `None` for `Left`.
    pub detector: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn arrived(
        tag_id: impl Into<String>,
        tag_name: impl Into<String>,
        detector: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: NotificationKind::Arrived,
            tag_id: tag_id.into(),
            tag_name: tag_name.into(),
            detector: Some(detector.into()),
            timestamp,
        }
    }

    #[must_use]
    pub fn left(tag_id: impl Into<String>, tag_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: NotificationKind::Left,
            tag_id: tag_id.into(),
            tag_name: tag_name.into(),
            detector: None,
            timestamp,
        }
    }
}

/// Outbound delivery of a single notification.
///
/// Implementations perform exactly one attempt per call; there is no
/// batching, deduplication or retry at this boundary.
pub trait Notifier: Send + Sync + fmt::Debug {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` if the notification could not be handed off.
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        (**self).notify(notification)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        (**self).notify(notification)
    }
}
