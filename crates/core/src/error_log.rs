//! Run-scoped log of recoverable failures.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Append-only, ordered list of human-readable failure messages.
///
/// Cheaply cloneable; all clones share the same entries. Appending never
/// fails and never aborts the run.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<RwLock<Vec<String>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure message.
    pub async fn push(&self, message: impl Into<String>) {
        self.entries.write().await.push(message.into());
    }

    /// Snapshot of all entries in append order.
    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry. Called when a new run starts.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Collapse line breaks so an error occupies a single log line.
pub fn single_line(message: &str) -> String {
    message
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
