//! Kind-keyed update timestamps for cache artifacts.
//!
//! The `timestamps.json` file in the cache directory maps encoder keys to
//! the UTC wall-clock time of their last persisted update, at second
//! precision. Sync decisions ("is the remote strictly newer?") compare
//! these stamps, so machines sharing a remote store need roughly
//! synchronized clocks.

use crate::error::{EngineError, EngineResult, SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Wall-clock format used inside the timestamp file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a time the way the timestamp file stores it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored stamp; `None` for anything malformed.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// The timestamp map, keyed by encoder key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamps(BTreeMap<String, String>);

impl Timestamps {
    pub const FILE_NAME: &'static str = "timestamps.json";

    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Loads the file; a missing file is an empty map.
    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&raw).map_err(|e| {
            EngineError::General(format!(
                "Timestamp file '{}' is corrupted: {e}\nSuggestion: Delete it and run an update to regenerate",
                path.display()
            ))
        })
    }

    /// Parses raw JSON, as fetched from a remote store.
    pub fn from_json(raw: &str) -> SyncResult<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::BadTimestampFile(e.to_string()))
    }

    /// Writes the map as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::General(format!("Failed to serialize timestamps: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, json).map_err(|e| EngineError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parsed stamp for a key.
    ///
    /// A malformed value counts as absent, so a well-formed stamp from
    /// elsewhere can still replace it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.0.get(key)?;
        match parse_timestamp(raw) {
            Some(at) => Some(at),
            None => {
                tracing::warn!("malformed timestamp '{raw}' for '{key}', treating as stale");
                None
            }
        }
    }

    /// Stored string for a key, unparsed.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stamps a key with the current UTC time.
    pub fn stamp(&mut self, key: &str) {
        self.set(key, Utc::now());
    }

    /// Sets a key to a specific time.
    pub fn set(&mut self, key: &str, at: DateTime<Utc>) {
        self.0.insert(key.to_string(), format_timestamp(at));
    }

    /// Sets a key to a raw string, bypassing formatting.
    pub fn set_raw(&mut self, key: &str, raw: impl Into<String>) {
        self.0.insert(key.to_string(), raw.into());
    }

    /// Copies the raw stamp for `key` from another map, if present.
    pub fn copy_from(&mut self, other: &Timestamps, key: &str) {
        if let Some(raw) = other.raw(key) {
            self.0.insert(key.to_string(), raw.to_string());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
