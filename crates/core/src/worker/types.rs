//! Types for the worker module.

use std::path::PathBuf;

use crate::catalog::PlaylistItem;
use crate::config::DownloaderConfig;
use crate::progress::ItemStatus;

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory receiving finished artifacts.
    pub target_dir: PathBuf,
    /// Prefix turning a source id into a downloadable URL.
    pub source_url_prefix: String,
    /// Downloads in flight at once (1 = sequential).
    pub max_parallel_downloads: usize,
}

impl From<&DownloaderConfig> for WorkerConfig {
    fn from(config: &DownloaderConfig) -> Self {
        Self {
            target_dir: config.target_dir.clone(),
            source_url_prefix: config.source_url_prefix.clone(),
            max_parallel_downloads: config.max_parallel_downloads,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&DownloaderConfig::default())
    }
}

/// A dequeued item bound to its artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub item: PlaylistItem,
    pub artifact_path: PathBuf,
}

/// Terminal outcome of a [`DownloadJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Downloaded and moved into place.
    Completed(PathBuf),
    /// Artifact already existed.
    Skipped(PathBuf),
    /// Download or move failed; the message is already in the error log.
    Failed(String),
    /// Aborted by cancellation.
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> ItemStatus {
        match self {
            JobOutcome::Completed(_) => ItemStatus::Completed,
            JobOutcome::Skipped(_) => ItemStatus::Skipped,
            JobOutcome::Failed(_) => ItemStatus::Failed,
            JobOutcome::Cancelled => ItemStatus::Cancelled,
        }
    }

    /// Artifact path for completed and skipped jobs.
    pub fn into_artifact(self) -> Option<PathBuf> {
        match self {
            JobOutcome::Completed(path) | JobOutcome::Skipped(path) => Some(path),
            JobOutcome::Failed(_) | JobOutcome::Cancelled => None,
        }
    }
}
