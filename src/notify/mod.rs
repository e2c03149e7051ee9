//! Outbound notifications.
//!
//! The `Notifier` trait is the delivery boundary. The processor calls it
//! once per presence transition; implementations decide how (or whether)
//! the notification leaves the process.

/// In-process recorder and dry-run logger.
pub mod memory;
/// Notification record and `Notifier` trait.
pub mod notification;
/// Bounded asynchronous delivery worker.
pub mod queued;
/// Positional message templates.
pub mod template;
/// HTTP webhook delivery.
#[cfg(feature = "webhook")]
pub mod webhook;

pub use memory::{LogNotifier, RecordingNotifier};
pub use notification::{Notification, NotificationKind, Notifier};
pub use queued::{DeliveryStats, QueuedNotifier};
pub use template::{MessageFormats, Template};
#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;
