//! Error types for the downloader module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while downloading and transcoding an item.
#[derive(Debug, Error)]
pub enum DownloaderError {
    /// Downloader binary not found.
    #[error("yt-dlp not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// Download process failed.
    #[error("Download failed: {reason}")]
    DownloadFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Download timed out.
    #[error("Download timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Process succeeded but the expected output file is missing.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// I/O error during download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Download was cancelled.
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloaderError {
    /// Creates a new download failed error with stderr output.
    pub fn download_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::DownloadFailed {
            reason: reason.into(),
            stderr,
        }
    }
}
