//! Tag registry.
//!
//! The registry owns every `Tag` record. It is populated once from the
//! persisted snapshot and never grows afterwards: ids that are not in the
//! snapshot are ignored. Presence is never written back, so a restart begins
//! with every tag ABSENT.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, TagwatchError, TagwatchResult};
use crate::tag::{PresenceState, Tag, TransitionKind};

/// Field of a snapshot entry holding the display name.
pub const DISPLAY_NAME_FIELD: &str = "name";

/// A registry shared between the ingest worker and observers.
///
/// Every mutation happens while holding the lock, so transition decisions
/// for a tag are totally ordered.
pub type SharedRegistry = Arc<Mutex<TagRegistry>>;

pub(crate) fn lock_registry(registry: &SharedRegistry) -> TagwatchResult<MutexGuard<'_, TagRegistry>> {
    registry
        .lock()
        .map_err(|_| TagwatchError::internal("poisoned lock: tag registry"))
}

/// Read-only view of one tag, as returned by [`TagRegistry::presence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPresence {
    pub tag_id: String,
    pub display_name: String,
    pub state: PresenceState,
}

/// Known tags keyed by id.
///
/// Backed by a `BTreeMap`, so sweeps visit tags in id order and return
/// a deterministic sequence.
#[derive(Debug, Default, Clone)]
pub struct TagRegistry {
    tags: BTreeMap<String, Tag>,
}

impl TagRegistry {
    /// Builds a registry from a snapshot of the form
    /// `{"<tag id>": {"name": "<display name>", ...}, ...}`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotAMapping` if the snapshot is not a JSON object,
    /// or `ConfigError::MissingDisplayName` if an entry has no non-empty
    /// string `name`.
    pub fn load(snapshot: &Value) -> Result<Self, ConfigError> {
        let Value::Object(entries) = snapshot else {
            return Err(ConfigError::NotAMapping);
        };

        let mut tags = BTreeMap::new();
        for (tag_id, entry) in entries {
            let name = entry
                .get(DISPLAY_NAME_FIELD)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| ConfigError::MissingDisplayName {
                    tag_id: tag_id.clone(),
                })?;
            tags.insert(tag_id.clone(), Tag::new(tag_id.clone(), name));
        }

        Ok(Self { tags })
    }

    /// Parses a snapshot document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid JSON, otherwise as [`TagRegistry::load`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: "<snapshot>".to_string(),
            message: e.to_string(),
        })?;
        Self::load(&value)
    }

    /// Reads and parses a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`TagRegistry::from_json_str`].
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

    /// Wraps the registry in a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn get(&self, tag_id: &str) -> Option<&Tag> {
        self.tags.get(tag_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tag ids in iteration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    #[must_use]
    pub fn present_count(&self) -> usize {
        self.tags.values().filter(|t| t.is_present()).count()
    }

    /// Snapshot of every tag's presence, ordered by tag id.
    #[must_use]
    pub fn presence(&self) -> Vec<TagPresence> {
        self.tags
            .values()
            .map(|tag| TagPresence {
                tag_id: tag.id().to_string(),
                display_name: tag.display_name().to_string(),
                state: tag.state(),
            })
            .collect()
    }

    /// Records that `tag_id` was detected at `now`.
    pub fn mark_seen(&mut self, tag_id: &str, now: DateTime<Utc>) -> TransitionKind {
        match self.tags.get_mut(tag_id) {
            Some(tag) => tag.mark_seen(now),
            None => TransitionKind::Ignored,
        }
    }

    /// Demotes every PRESENT tag unseen for at least `timeout` to ABSENT.
    ///
    /// Returns the demoted tag ids in id order, each paired with
    /// `TransitionKind::Left`.
    pub fn sweep_timeouts(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<(String, TransitionKind)> {
        let mut left = Vec::new();
        for (id, tag) in &mut self.tags {
            if let Some(last_seen) = tag.last_seen() {
                debug!(
                    tag_id = %id,
                    elapsed_secs = (now - last_seen).num_seconds(),
                    "presence check"
                );
            }
            if let Some(kind) = tag.expire(now, timeout) {
                left.push((id.clone(), kind));
            }
        }
        left
    }
}
