//! Mock media downloader for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::downloader::{
    AudioCodec, DownloadProgress, DownloadRequest, DownloadResult, DownloaderError,
    MediaDownloader,
};

/// Mock implementation of the MediaDownloader trait.
///
/// Clones share state, so a test can keep one clone for assertions while the
/// worker owns another. Successful downloads write a small file at the
/// requested output path.
///
/// # Example
///
/// ```rust,ignore
/// use playlist_ingest_core::testing::MockDownloader;
///
/// let downloader = MockDownloader::new();
/// let calls = downloader.clone();
/// downloader.fail_for("video2", "ERROR: Video unavailable").await;
///
/// // ... run a worker with `downloader` ...
///
/// assert_eq!(calls.download_count().await, 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockDownloader {
    codec: AudioCodec,
    /// Every request received, including failed and aborted ones.
    requests: Arc<RwLock<Vec<DownloadRequest>>>,
    /// Failure reasons by source id.
    failures: Arc<RwLock<HashMap<String, String>>>,
    /// Simulated download duration.
    delay: Arc<RwLock<Duration>>,
    clear_cache_fails: Arc<RwLock<bool>>,
    cache_clears: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even when the download future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockDownloader {
    /// Create a new mock downloader producing mp3 files instantly.
    pub fn new() -> Self {
        Self {
            codec: AudioCodec::Mp3,
            requests: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            clear_cache_fails: Arc::new(RwLock::new(false)),
            cache_clears: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Produce files with a different codec.
    pub fn with_codec(mut self, codec: AudioCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Get all recorded download requests.
    pub async fn recorded_requests(&self) -> Vec<DownloadRequest> {
        self.requests.read().await.clone()
    }

    /// Number of download calls received.
    pub async fn download_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Number of cache clears performed.
    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }

    /// Highest number of downloads observed running at once.
    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make every download of `source_id` fail with `reason`.
    pub async fn fail_for(&self, source_id: impl Into<String>, reason: impl Into<String>) {
        self.failures
            .write()
            .await
            .insert(source_id.into(), reason.into());
    }

    /// Make `clear_cache` fail.
    pub async fn set_clear_cache_fails(&self, fails: bool) {
        *self.clear_cache_fails.write().await = fails;
    }

    /// Set the simulated download duration.
    pub async fn set_download_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl MediaDownloader for MockDownloader {
    fn name(&self) -> &str {
        "mock"
    }

    fn codec(&self) -> AudioCodec {
        self.codec
    }

    async fn download(
        &self,
        request: DownloadRequest,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadResult, DownloaderError> {
        self.requests.write().await.push(request.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(self.in_flight.clone());
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(tx) = &progress_tx {
            let _ = tx.try_send(DownloadProgress {
                source_id: request.source_id.clone(),
                downloaded_bytes: 0,
                total_bytes: Some(1024),
            });
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.failures.read().await.get(&request.source_id) {
            return Err(DownloaderError::download_failed(reason.clone(), None));
        }

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = format!("audio for {}", request.source_id);
        tokio::fs::write(&request.output_path, contents.as_bytes()).await?;

        if let Some(tx) = &progress_tx {
            let _ = tx.try_send(DownloadProgress {
                source_id: request.source_id.clone(),
                downloaded_bytes: 1024,
                total_bytes: Some(1024),
            });
        }

        Ok(DownloadResult {
            source_id: request.source_id,
            output_path: request.output_path,
            size_bytes: contents.len() as u64,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn clear_cache(&self) -> Result<(), DownloaderError> {
        if *self.clear_cache_fails.read().await {
            return Err(DownloaderError::download_failed("cache dir locked", None));
        }
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn validate(&self) -> Result<(), DownloaderError> {
        Ok(())
    }
}
