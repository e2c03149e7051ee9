//! Runtime configuration.
//!
//! Configuration is a JSON document with three sections:
//!
//! ```json
//! {
//!   "monitor": { "timeout_sec": 30, "sweep_interval_sec": 5, "tags_path": "tags.json" },
//!   "webhook": {
//!     "url_format": "https://maker.ifttt.com/trigger/{}/with/key/{}",
//!     "event": "tag_event",
//!     "key": "secret",
//!     "msg_arrive_format": "{} arrived at {}",
//!     "msg_leave_format": "{} left"
//!   },
//!   "ingest": { "queue_capacity": 1024, "delivery_queue_capacity": 256 }
//! }
//! ```
//!
//! Every field has a default. [`Config::validate`] runs after loading and any
//! failure is a fatal `ConfigError`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::notify::{MessageFormats, Template};

/// Largest timeout a `chrono::Duration` can hold in whole seconds.
pub const MAX_TIMEOUT_SEC: u64 = (i64::MAX / 1000) as u64;

/// Presence tracking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds without a sighting after which a tag is considered gone.
    pub timeout_sec: u64,
    /// Sweep timer period. Defaults to half the timeout, at least one second.
    pub sweep_interval_sec: Option<u64>,
    /// Also sweep after every inbound message.
    pub sweep_on_message: bool,
    /// Tag snapshot file.
    pub tags_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 30,
            sweep_interval_sec: None,
            sweep_on_message: false,
            tags_path: PathBuf::from("tags.json"),
        }
    }
}

impl MonitorConfig {
    /// The presence timeout. Values above [`MAX_TIMEOUT_SEC`] are rejected by
    /// [`Config::validate`] and saturate here.
    #[must_use]
    pub fn timeout(&self) -> chrono::Duration {
        let secs = self.timeout_sec.min(MAX_TIMEOUT_SEC);
        chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(0)).unwrap_or_else(chrono::Duration::zero)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        let secs = self
            .sweep_interval_sec
            .unwrap_or_else(|| (self.timeout_sec / 2).max(1))
            .min(self.timeout_sec.max(1));
        std::time::Duration::from_secs(secs)
    }
}

/// Outbound webhook parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// URL template formatted with (event, key).
    pub url_format: String,
    pub event: String,
    pub key: String,
    /// Formatted with (tag name, detector name).
    pub msg_arrive_format: String,
    /// Formatted with (tag name).
    pub msg_leave_format: String,
    pub request_timeout_sec: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url_format: "https://maker.ifttt.com/trigger/{}/with/key/{}".to_string(),
            event: String::new(),
            key: String::new(),
            msg_arrive_format: "{} arrived at {}".to_string(),
            msg_leave_format: "{} left".to_string(),
            request_timeout_sec: 10,
        }
    }
}

impl WebhookConfig {
    /// Parses the message templates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Template` for an invalid template.
    pub fn message_formats(&self) -> Result<MessageFormats, ConfigError> {
        MessageFormats::parse(&self.msg_arrive_format, &self.msg_leave_format)
    }

    /// Checks that the webhook can actually be called.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `event` or `key` is empty.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        for (field, value) in [("webhook.event", &self.event), ("webhook.key", &self.key)] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Queue sizes for the ingest and delivery workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    pub delivery_queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            delivery_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub webhook: WebhookConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON, or any error from
    /// [`Config::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: "<config>".to_string(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`Config::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&raw).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Validates value ranges and templates.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.timeout_sec == 0 {
            return Err(invalid("monitor.timeout_sec", "must be greater than zero"));
        }
        if self.monitor.timeout_sec > MAX_TIMEOUT_SEC {
            return Err(invalid("monitor.timeout_sec", "is too large"));
        }
        if let Some(interval) = self.monitor.sweep_interval_sec {
            if interval == 0 || interval > self.monitor.timeout_sec {
                return Err(invalid(
                    "monitor.sweep_interval_sec",
                    "must be between 1 and monitor.timeout_sec",
                ));
            }
        }
        if self.webhook.request_timeout_sec == 0 {
            return Err(invalid("webhook.request_timeout_sec", "must be greater than zero"));
        }
        if self.ingest.queue_capacity == 0 {
            return Err(invalid("ingest.queue_capacity", "must be greater than zero"));
        }
        if self.ingest.delivery_queue_capacity == 0 {
            return Err(invalid("ingest.delivery_queue_capacity", "must be greater than zero"));
        }

        Template::parse("webhook.url_format", &self.webhook.url_format, 2)?;
        self.webhook.message_formats()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = Config::from_json_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.monitor.timeout(), chrono::Duration::seconds(30));
        assert_eq!(cfg.monitor.sweep_interval(), std::time::Duration::from_secs(15));
    }

    #[test]
    fn sweep_interval_never_exceeds_timeout() {
        let cfg = Config::from_json_str(r#"{"monitor": {"timeout_sec": 1}}"#).unwrap();
        assert_eq!(cfg.monitor.sweep_interval(), std::time::Duration::from_secs(1));

        let err = Config::from_json_str(r#"{"monitor": {"timeout_sec": 10, "sweep_interval_sec": 11}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "monitor.sweep_interval_sec"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::from_json_str(r#"{"monitor": {"timeout_sec": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "monitor.timeout_sec"));
    }

    #[test]
    fn rejects_timeout_beyond_duration_range() {
        let err = Config::from_json_str(r#"{"monitor": {"timeout_sec": 10000000000000000, "sweep_interval_sec": 1}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "monitor.timeout_sec"));

        let json = format!(r#"{{"monitor": {{"timeout_sec": {MAX_TIMEOUT_SEC}, "sweep_interval_sec": 1}}}}"#);
        let cfg = Config::from_json_str(&json).unwrap();
        assert_eq!(cfg.monitor.timeout().num_seconds(), i64::MAX / 1000);
    }

    #[test]
    fn rejects_bad_templates() {
        let err = Config::from_json_str(r#"{"webhook": {"msg_leave_format": "{} left {}"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Template { .. }));

        let err = Config::from_json_str(r#"{"webhook": {"url_format": "http://x/{}/{}/{}"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Template { ref field, .. } if field == "webhook.url_format"));
    }

    #[test]
    fn credentials_required_only_on_demand() {
        let cfg = Config::from_json_str(r#"{"webhook": {"event": "tag"}}"#).unwrap();
        let err = cfg.webhook.require_credentials().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "webhook.key"));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagwatch.json");
        fs::write(&path, r#"{"monitor": {"timeout_sec": 60, "tags_path": "/etc/tags.json"}}"#).unwrap();

        let cfg = Config::from_path(&path).unwrap();
        assert_eq!(cfg.monitor.timeout_sec, 60);
        assert_eq!(cfg.monitor.tags_path, PathBuf::from("/etc/tags.json"));

        fs::write(&path, "{").unwrap();
        let err = Config::from_path(&path).unwrap_err();
        match err {
            ConfigError::Parse { path: p, .. } => assert!(p.ends_with("tagwatch.json")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
