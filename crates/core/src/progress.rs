//! Progress reporting for a pipeline run.
//!
//! Components emit [`ProgressEvent`]s through a [`ProgressHandle`]. Sending is
//! non-blocking: when the consumer falls behind, events are dropped rather
//! than stalling downloads or uploads.

use std::path::PathBuf;
use tokio::sync::mpsc;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Listing,
    Draining,
    Uploading,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Listing => "listing",
            Stage::Draining => "draining",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Completed => "completed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Failed => "failed",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageChanged {
        from: Stage,
        to: Stage,
    },
    /// Catalog page fetched; `items` is the running total.
    PageFetched {
        page: u32,
        items: usize,
    },
    BatchStarted {
        total: usize,
    },
    ItemStarted {
        source_id: String,
        name: String,
    },
    DownloadProgress {
        source_id: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    ItemFinished {
        source_id: String,
        completed: usize,
        total: usize,
        status: ItemStatus,
    },
    UploadStarted {
        total: usize,
    },
    UploadFileStarted {
        key: String,
        size_bytes: u64,
    },
    UploadProgress {
        key: String,
        sent_bytes: u64,
        total_bytes: u64,
    },
    UploadFileFinished {
        key: String,
        path: PathBuf,
        completed: usize,
        total: usize,
    },
}

/// Handle for emitting progress events.
///
/// Cheaply cloneable. A disabled handle discards everything, which is what
/// components use when nobody renders progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressHandle {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a handle together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// A handle that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event without blocking.
    ///
    /// Returns true if the event was queued. A full or closed channel drops
    /// the event.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => match tx.try_send(event) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => false,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!("Progress receiver closed, dropping event");
                    false
                }
            },
            None => false,
        }
    }
}
