//! Error type shared by every survey component.
//!
//! | Variant | Raised for |
//! |---------|------------|
//! | [`Configuration`](SurveyError::Configuration) | bad config values, empty or unparseable shard directories, resolution mismatches |
//! | [`DataIntegrity`](SurveyError::DataIntegrity) | `nmem` mismatches, unresolved cluster ids, duplicate pixels, missing columns |
//! | [`Io`](SurveyError::Io) | missing or unreadable files |
//! | [`CorruptTable`](SurveyError::CorruptTable) | table files with a bad header or truncated payload |
//!
//! All variants are fatal for the run that produced them. Cosine round-off in
//! angular distances is clamped, never reported.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt table {path:?}: {message}")]
    CorruptTable { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, SurveyError>;

impl SurveyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::CorruptTable {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}
