//! Playlist catalog access.
//!
//! A catalog enumerates the members of a remote playlist. The default
//! implementation talks to the YouTube Data API; tests use
//! [`crate::testing::MockCatalog`].

mod types;
mod youtube;

pub use types::*;
pub use youtube::YoutubeCatalogClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::error_log::ErrorLog;

/// Errors that abort playlist enumeration.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status with a body that is not a catalog response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    /// Client not configured (missing API key, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

impl CatalogError {
    /// Metric label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Http(_) => "http",
            CatalogError::Api { .. } => "api",
            CatalogError::MalformedResponse(_) => "malformed",
            CatalogError::NotConfigured(_) => "not_configured",
        }
    }
}

/// Read-only access to a remote playlist.
#[async_trait]
pub trait PlaylistCatalog: Send + Sync {
    /// Catalog name for logging.
    fn name(&self) -> &str;

    /// Fetch every member of the playlist, following pagination to the end.
    ///
    /// Items are returned in server order. Entries that cannot be projected
    /// and errors reported by the server inside a response are appended to
    /// `errors`; only transport failures and unparseable pages are returned
    /// as `Err`.
    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        errors: &ErrorLog,
    ) -> Result<Vec<PlaylistItem>, CatalogError>;
}
