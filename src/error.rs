//! Error types for the two external seams
//!
//! Everything else uses `anyhow`. These never escape a cycle: the caller logs
//! them and degrades to a no-op.

use std::time::Duration;
use thiserror::Error;

/// Failure consulting the external advisor
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn advisor `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("advisor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed advisor reply: {0}")]
    Malformed(String),

    #[error("advisor unavailable: {0}")]
    Unavailable(String),
}

/// Failure reading or writing a persisted document
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{file}: schema version {found} is newer than supported {supported}")]
    UnsupportedVersion {
        file: &'static str,
        found: u32,
        supported: u32,
    },

    #[error("persistence I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {file}: {source}")]
    Json {
        file: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
