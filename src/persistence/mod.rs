//! Persistence Module
//!
//! One versioned JSON document per concern plus a daily CSV trade journal.
//! Documents are written as `{version, saved_at, data}` envelopes via a temp
//! file and a rename, so a crash mid-write leaves the previous copy intact.
//! No document references another; each upgrades on its own.

mod documents;
mod journal;

pub use journal::{JournalRow, TradeJournal};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PersistError;

/// A record type persisted as its own file
pub trait Document: Serialize + DeserializeOwned {
    const FILE_NAME: &'static str;
    const VERSION: u32;

    /// Migrate `data` written at schema `from` (< `VERSION`) to the current
    /// shape. Files written before envelopes existed arrive as version 0.
    fn upgrade(from: u32, data: Value) -> Result<Value, PersistError> {
        let _ = from;
        Ok(data)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    saved_at: DateTime<Utc>,
    data: T,
}

/// JSON document store rooted at one data directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of<D: Document>(&self) -> PathBuf {
        self.dir.join(D::FILE_NAME)
    }

    fn io_error(path: &Path, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Write `doc` atomically (temp file, then rename)
    pub fn save<D: Document>(&self, doc: &D) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let envelope = Envelope {
            version: D::VERSION,
            saved_at: Utc::now(),
            data: doc,
        };
        let json = serde_json::to_string_pretty(&envelope).map_err(|source| PersistError::Json {
            file: D::FILE_NAME,
            source,
        })?;

        let path = self.path_of::<D>();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Self::io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e))?;
        debug!(file = D::FILE_NAME, "💾 Document saved");
        Ok(())
    }

    /// Load a document. A missing file is `Ok(None)`; older versions go
    /// through `Document::upgrade`; newer ones are rejected.
    pub fn load<D: Document>(&self) -> Result<Option<D>, PersistError> {
        let path = self.path_of::<D>();
        if !path.exists() {
            info!(file = D::FILE_NAME, "💾 No persisted document, starting fresh");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| Self::io_error(&path, e))?;
        let json_err = |source| PersistError::Json {
            file: D::FILE_NAME,
            source,
        };
        let value: Value = serde_json::from_str(&raw).map_err(json_err)?;

        let (version, data) = split_envelope(value);
        if version > D::VERSION {
            return Err(PersistError::UnsupportedVersion {
                file: D::FILE_NAME,
                found: version,
                supported: D::VERSION,
            });
        }
        let data = if version < D::VERSION {
            info!(file = D::FILE_NAME, from = version, to = D::VERSION, "💾 Upgrading document");
            D::upgrade(version, data)?
        } else {
            data
        };
        let doc = serde_json::from_value(data).map_err(json_err)?;
        Ok(Some(doc))
    }

    /// Delete a document if present
    pub fn remove<D: Document>(&self) -> Result<(), PersistError> {
        let path = self.path_of::<D>();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| Self::io_error(&path, e))?;
        }
        Ok(())
    }
}

/// `(version, data)` from an envelope; bare legacy payloads are version 0
fn split_envelope(value: Value) -> (u32, Value) {
    if let Value::Object(mut map) = value {
        let version = map.get("version").and_then(Value::as_u64);
        if let (Some(version), true) = (version, map.contains_key("data")) {
            let data = map.remove("data").unwrap_or(Value::Null);
            return (version as u32, data);
        }
        return (0, Value::Object(map));
    }
    (0, value)
}
