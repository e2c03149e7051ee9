//! In-process notifiers: a recorder for tests and embedding, and a logger
//! used for dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::info;

use crate::error::DeliveryError;

use super::notification::{Notification, Notifier};
use super::template::MessageFormats;

/// Keeps every notification it is asked to deliver.
///
/// Failure injection: `fail_next(n)` makes the next `n` calls return
/// `DeliveryError::Transport`. Failed calls are still recorded as attempts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    attempts: Mutex<Vec<Notification>>,
    fail_remaining: AtomicUsize,
    failures: AtomicUsize,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Every attempted notification, in call order.
    #[must_use]
    pub fn attempts(&self) -> Vec<Notification> {
        self.attempts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Attempts filtered to a single tag.
    #[must_use]
    pub fn for_tag(&self, tag_id: &str) -> Vec<Notification> {
        self.attempts().into_iter().filter(|n| n.tag_id == tag_id).collect()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.attempts.lock() {
            guard.clear();
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        if let Ok(mut guard) = self.attempts.lock() {
            guard.push(notification.clone());
        }

        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(DeliveryError::Transport {
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Logs the rendered message instead of sending it.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    formats: MessageFormats,
}

impl LogNotifier {
    #[must_use]
    pub const fn new(formats: MessageFormats) -> Self {
        Self { formats }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            kind = %notification.kind,
            tag_id = %notification.tag_id,
            message = %self.formats.render(notification),
            "notification (dry run)"
        );
        Ok(())
    }
}
