//! # tagwatch - presence tracking for RFID/BLE tags
//!
//! Detector nodes publish which tags they can currently see. tagwatch keeps a
//! two-state presence machine per known tag and emits exactly one "arrived"
//! or "left" notification per state change.
//!
//! ## Core Concepts
//!
//! - **Tag**: a known beacon with a display name and a `PresenceState`
//! - **TagRegistry**: owns every tag; loaded once from a snapshot file
//! - **EventProcessor**: applies detection events and timeout sweeps
//! - **Notifier**: the outbound delivery boundary (webhook, queue, recorder)
//! - **PresenceMonitor**: ingest worker with an independent sweep timer
//!
//! Absence is never reported by detectors. A tag becomes ABSENT once it has
//! gone unseen for at least the configured timeout.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use tagwatch::{DetectionEvent, EventProcessor, Notifier, RecordingNotifier, TagRegistry};
//!
//! let registry = TagRegistry::from_json_str(r#"{"A1B2": {"name": "front-door"}}"#)?.into_shared();
//! let recorder = Arc::new(RecordingNotifier::new());
//! let notifier: Arc<dyn Notifier> = recorder.clone();
//! let processor = EventProcessor::new(registry, notifier);
//!
//! let t0 = Utc::now();
//! processor.on_detection_event(&DetectionEvent::new("hall", ["A1B2"], t0))?;
//! processor.on_timeout_sweep(t0 + Duration::seconds(30), Duration::seconds(30))?;
//! assert_eq!(recorder.attempts().len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod notify;
pub mod processor;
pub mod registry;
pub mod tag;

// Re-export primary types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, IngestConfig, MonitorConfig, WebhookConfig};
pub use error::{ConfigError, DeliveryError, PayloadError, TagwatchError, TagwatchResult};
pub use event::DetectionEvent;
pub use ingest::{IngestHandle, IngestSettings, IngestStats, PresenceMonitor};
pub use notify::{
    DeliveryStats, LogNotifier, MessageFormats, Notification, NotificationKind, Notifier, QueuedNotifier,
    RecordingNotifier, Template,
};
#[cfg(feature = "webhook")]
pub use notify::WebhookNotifier;
pub use processor::EventProcessor;
pub use registry::{SharedRegistry, TagPresence, TagRegistry};
pub use tag::{PresenceState, Tag, TransitionKind};
