//! Detection events decoded from inbound detector payloads.
//!
//! Wire shape: `{"monitor_name": "<detector>", "tag_detected": ["<tag id>", ...]}`.
//! Extra fields are tolerated; anything else is a `PayloadError`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PayloadError;

pub const DETECTOR_FIELD: &str = "monitor_name";
pub const TAGS_FIELD: &str = "tag_detected";

/// One detector report, stamped with the time it was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub detector: String,
    /// Detected tag ids, duplicates removed, first occurrence order kept.
    pub tags: Vec<String>,
    pub at: DateTime<Utc>,
}

impl DetectionEvent {
    #[must_use]
    pub fn new<I, S>(detector: impl Into<String>, tags: I, at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into();
            if seen.insert(tag.clone()) {
                unique.push(tag);
            }
        }
        Self {
            detector: detector.into(),
            tags: unique,
            at,
        }
    }

    /// Decodes a raw payload.
    ///
    /// # Errors
    ///
    /// Returns a `PayloadError` if the bytes are not JSON of the expected
    /// shape.
    pub fn from_slice(payload: &[u8], at: DateTime<Utc>) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(payload).map_err(|e| PayloadError::Json {
            message: e.to_string(),
        })?;
        Self::from_value(&value, at)
    }

    /// Decodes an already-parsed payload.
    ///
    /// # Errors
    ///
    /// See [`DetectionEvent::from_slice`].
    pub fn from_value(value: &Value, at: DateTime<Utc>) -> Result<Self, PayloadError> {
        let Value::Object(obj) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let detector = match obj.get(DETECTOR_FIELD) {
            None => return Err(missing(DETECTOR_FIELD)),
            Some(Value::String(s)) => s.clone(),
            Some(other) => return Err(invalid(DETECTOR_FIELD, format!("expected string, got {other}"))),
        };

        let raw_tags = match obj.get(TAGS_FIELD) {
            None => return Err(missing(TAGS_FIELD)),
            Some(Value::Array(items)) => items,
            Some(other) => return Err(invalid(TAGS_FIELD, format!("expected array, got {other}"))),
        };

        let mut tags = Vec::with_capacity(raw_tags.len());
        for item in raw_tags {
            match item {
                Value::String(s) => tags.push(s.clone()),
                other => return Err(invalid(TAGS_FIELD, format!("expected string tag id, got {other}"))),
            }
        }

        Ok(Self::new(detector, tags, at))
    }
}

fn missing(field: &str) -> PayloadError {
    PayloadError::MissingField {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: String) -> PayloadError {
    PayloadError::InvalidField {
        field: field.to_string(),
        reason,
    }
}
