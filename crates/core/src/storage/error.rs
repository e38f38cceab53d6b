//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while uploading artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Staged file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Store rejected the object.
    #[error("Upload of {key} rejected: {status} - {message}")]
    Rejected {
        key: String,
        status: u16,
        message: String,
    },

    /// No usable credentials.
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    /// Store not configured.
    #[error("Storage not configured: {0}")]
    NotConfigured(String),

    /// Upload was cancelled.
    #[error("Upload cancelled")]
    Cancelled,
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
