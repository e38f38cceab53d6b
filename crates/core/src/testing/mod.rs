//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam of the pipeline, so runs can be exercised
//! end to end without the network or a `yt-dlp` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use playlist_ingest_core::testing::{fixtures, MockCatalog, MockDownloader, MockObjectStore};
//!
//! let catalog = MockCatalog::new();
//! catalog.set_items(fixtures::playlist(3)).await;
//!
//! let downloader = MockDownloader::new();
//! downloader.fail_for("video2", "ERROR: Video unavailable").await;
//!
//! let store = MockObjectStore::new();
//! store.fail_on_call(2).await;
//! ```

mod mock_catalog;
mod mock_downloader;
mod mock_object_store;

pub use mock_catalog::MockCatalog;
pub use mock_downloader::MockDownloader;
pub use mock_object_store::MockObjectStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::PlaylistItem;

    /// A playlist item with the fixture naming scheme.
    pub fn playlist_item(n: usize) -> PlaylistItem {
        PlaylistItem::new(
            format!("Artist {}", n),
            format!("Track {}", n),
            format!("video{}", n),
        )
    }

    /// `n` distinct items, `video1` through `video<n>`.
    pub fn playlist(n: usize) -> Vec<PlaylistItem> {
        (1..=n).map(playlist_item).collect()
    }

    /// Raw `playlistItems.list` entry as JSON, as the YouTube Data API returns it.
    pub fn raw_entry(item: &PlaylistItem) -> serde_json::Value {
        serde_json::json!({
            "kind": "youtube#playlistItem",
            "snippet": {
                "title": item.title,
                "videoOwnerChannelTitle": item.author,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": item.source_id,
                }
            }
        })
    }

    /// One page of a `playlistItems.list` response.
    pub fn playlist_page(items: &[PlaylistItem], next_page_token: Option<&str>) -> serde_json::Value {
        let mut page = serde_json::json!({
            "kind": "youtube#playlistItemListResponse",
            "items": items.iter().map(raw_entry).collect::<Vec<_>>(),
        });
        if let Some(token) = next_page_token {
            page["nextPageToken"] = serde_json::Value::String(token.to_string());
        }
        page
    }
}
