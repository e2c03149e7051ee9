//! Error types for tagwatch.
//!
//! All errors in tagwatch are strongly typed using thiserror.
//! Only configuration errors are fatal; payload and delivery errors
//! are logged by the caller and processing continues.

use thiserror::Error;

/// Configuration and snapshot errors. Fatal at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse {
        path: String,
        message: String,
    },

    #[error("Tag snapshot must be a mapping of tag id to tag entry")]
    NotAMapping,

    #[error("Tag '{tag_id}' has no display name")]
    MissingDisplayName {
        tag_id: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("Invalid template '{field}': {reason}")]
    Template {
        field: String,
        reason: String,
    },
}

/// Errors decoding an inbound detection payload. The event is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Payload is not valid JSON: {message}")]
    Json {
        message: String,
    },

    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },
}

/// Notification delivery failures. The state transition is already committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
    },

    #[error("Webhook responded with status {code}: {body}")]
    Status {
        code: u16,
        body: String,
    },

    #[error("Delivery queue is full")]
    QueueFull,

    #[error("Delivery worker is disconnected")]
    Disconnected,
}

/// Top-level error type for tagwatch.
#[derive(Debug, Error)]
pub enum TagwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TagwatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_payload(&self) -> bool {
        matches!(self, Self::Payload(_))
    }

    #[must_use]
    pub const fn is_delivery(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error should terminate the process.
    ///
    /// Only startup configuration errors are fatal; everything that can
    /// happen in steady state is logged and skipped.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for tagwatch operations.
pub type TagwatchResult<T> = Result<T, TagwatchError>;
