//! Event processor.
//!
//! Applies detection events and timeout sweeps to the shared registry and
//! fires exactly one notification per ARRIVED or LEFT transition. Transition
//! decisions and the hand-off to the notifier both happen under the registry
//! lock, so notifications for one tag are issued in decision order.
//!
//! A failed delivery is logged and otherwise ignored: the registry is the
//! source of truth and is never rolled back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{TagwatchError, TagwatchResult};
use crate::event::DetectionEvent;
use crate::notify::{Notification, Notifier};
use crate::registry::{lock_registry, SharedRegistry};
use crate::tag::TransitionKind;

#[derive(Debug, Clone)]
pub struct EventProcessor {
    registry: SharedRegistry,
    notifier: Arc<dyn Notifier>,
}

impl EventProcessor {
    #[must_use]
    pub fn new(registry: SharedRegistry, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Handle to the registry this processor mutates.
    #[must_use]
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Decodes a raw inbound payload and applies it.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Payload` if the payload is malformed; the
    /// registry is untouched in that case.
    pub fn handle_payload(&self, payload: &[u8], now: DateTime<Utc>) -> TagwatchResult<Vec<Notification>> {
        let event = DetectionEvent::from_slice(payload, now)?;
        info!(detector = %event.detector, tags = ?event.tags, at = %now, "received payload");
        self.on_detection_event(&event)
    }

    /// Marks every detected tag as seen at `event.at`.
    ///
    /// Returns the notifications issued, one per tag that arrived. Delivery
    /// failures do not change the result.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the registry lock is poisoned.
    pub fn on_detection_event(&self, event: &DetectionEvent) -> TagwatchResult<Vec<Notification>> {
        let mut registry = lock_registry(&self.registry)?;
        let mut issued = Vec::new();

        for tag_id in &event.tags {
            match registry.mark_seen(tag_id, event.at) {
                TransitionKind::Arrived => {
                    let Some(tag) = registry.get(tag_id) else {
                        return Err(TagwatchError::internal(format!("tag '{tag_id}' vanished after arrival")));
                    };
                    info!(
                        tag_id = %tag_id,
                        tag_name = %tag.display_name(),
                        detector = %event.detector,
                        at = %event.at,
                        "tag arrived"
                    );
                    let notification = Notification::arrived(tag_id, tag.display_name(), &event.detector, event.at);
                    self.dispatch(&notification);
                    issued.push(notification);
                }
                TransitionKind::Refreshed => {
                    debug!(tag_id = %tag_id, detector = %event.detector, "tag refreshed");
                }
                TransitionKind::Ignored => {
                    debug!(tag_id = %tag_id, detector = %event.detector, "unknown tag ignored");
                }
                TransitionKind::Left => {}
            }
        }

        Ok(issued)
    }

    /// Demotes tags unseen for at least `timeout` and issues one LEFT
    /// notification for each.
    ///
    /// # Errors
    ///
    /// Returns `TagwatchError::Internal` if the registry lock is poisoned.
    pub fn on_timeout_sweep(&self, now: DateTime<Utc>, timeout: Duration) -> TagwatchResult<Vec<Notification>> {
        let mut registry = lock_registry(&self.registry)?;
        let left = registry.sweep_timeouts(now, timeout);

        let mut issued = Vec::with_capacity(left.len());
        for (tag_id, _) in left {
            let Some(tag) = registry.get(&tag_id) else {
                return Err(TagwatchError::internal(format!("tag '{tag_id}' vanished after timeout")));
            };
            info!(tag_id = %tag_id, tag_name = %tag.display_name(), at = %now, "tag left");
            let notification = Notification::left(tag_id.as_str(), tag.display_name(), now);
            self.dispatch(&notification);
            issued.push(notification);
        }

        Ok(issued)
    }

    fn dispatch(&self, notification: &Notification) {
        if let Err(error) = self.notifier.notify(notification) {
            warn!(
                kind = %notification.kind,
                tag_id = %notification.tag_id,
                detector = notification.detector.as_deref().unwrap_or(""),
                at = %notification.timestamp,
                %error,
                "notification not delivered; transition kept"
            );
        }
    }
}
