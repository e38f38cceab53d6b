//! Trait definitions for the downloader module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::DownloaderError;
use super::types::{AudioCodec, DownloadProgress, DownloadRequest, DownloadResult};

/// A tool that fetches a remote media item and transcodes it to audio.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Returns the name of this downloader implementation.
    fn name(&self) -> &str;

    /// Codec of the files this downloader produces.
    fn codec(&self) -> AudioCodec;

    /// Downloads and transcodes `request.source_url` into `request.output_path`.
    ///
    /// Progress updates are sent without blocking; if the receiver is gone
    /// or full, the download continues. Dropping the returned future aborts
    /// the download.
    async fn download(
        &self,
        request: DownloadRequest,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadResult, DownloaderError>;

    /// Clears the downloader's local cache.
    async fn clear_cache(&self) -> Result<(), DownloaderError>;

    /// Validates that the downloader is installed and usable.
    async fn validate(&self) -> Result<(), DownloaderError>;
}
