//! HTTP webhook notifier (IFTTT maker-style).
//!
//! Each notification is one `POST` to the configured URL with body
//! `{"value1": "<rendered message>"}`. Any non-2xx status or transport
//! failure is a `DeliveryError`; there is no retry here.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::info;

use crate::config::WebhookConfig;
use crate::error::{ConfigError, DeliveryError};

use super::notification::{Notification, Notifier};
use super::template::{MessageFormats, Template};

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    value1: &'a str,
}

/// Blocking webhook client. Wrap in a `QueuedNotifier` to keep it off the
/// ingest path.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    formats: MessageFormats,
}

impl WebhookNotifier {
    /// Builds a notifier from the webhook configuration section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Template` for invalid templates, or
    /// `ConfigError::InvalidValue` if the HTTP client cannot be built.
    pub fn new(cfg: &WebhookConfig) -> Result<Self, ConfigError> {
        let url = Template::parse("webhook.url_format", &cfg.url_format, 2)?.render(&[cfg.event.as_str(), cfg.key.as_str()]);
        let formats = MessageFormats::parse(&cfg.msg_arrive_format, &cfg.msg_leave_format)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_sec))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "webhook".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, url, formats })
    }

    /// The rendered target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let message = self.formats.render(notification);
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookBody { value1: &message })
            .send()
            .map_err(|e| DeliveryError::Transport { message: e.to_string() })?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                code: status.as_u16(),
                body,
            });
        }

        info!(
            kind = %notification.kind,
            tag_id = %notification.tag_id,
            status = status.as_u16(),
            response = %body,
            "webhook delivered"
        );
        Ok(())
    }
}
