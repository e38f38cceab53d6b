//! Mock playlist catalog for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{CatalogError, PlaylistCatalog, PlaylistItem};
use crate::error_log::ErrorLog;

/// Mock implementation of the PlaylistCatalog trait.
///
/// Returns a preset item list, optionally appending preset entries to the
/// error log the way a real catalog reports skipped records.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    items: Arc<RwLock<Vec<PlaylistItem>>>,
    /// Entries pushed to the error log on every listing.
    reported_errors: Arc<RwLock<Vec<String>>>,
    /// If set, the next listing fails with this error.
    next_error: Arc<RwLock<Option<CatalogError>>>,
    /// Playlist ids requested so far.
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockCatalog {
    /// Create a new mock catalog with an empty playlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the playlist contents.
    pub async fn set_items(&self, items: Vec<PlaylistItem>) {
        *self.items.write().await = items;
    }

    /// Report `message` to the error log on each listing.
    pub async fn report_error(&self, message: impl Into<String>) {
        self.reported_errors.write().await.push(message.into());
    }

    /// Configure the next listing to fail with the given error.
    pub async fn set_next_error(&self, error: CatalogError) {
        *self.next_error.write().await = Some(error);
    }

    /// Playlist ids that were listed.
    pub async fn recorded_requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl PlaylistCatalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        errors: &ErrorLog,
    ) -> Result<Vec<PlaylistItem>, CatalogError> {
        self.requests.write().await.push(playlist_id.to_string());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        for message in self.reported_errors.read().await.iter() {
            errors.push(message.clone()).await;
        }

        Ok(self.items.read().await.clone())
    }
}
