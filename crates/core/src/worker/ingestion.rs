//! Ingestion worker implementation.

use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::artifact_file_name;
use crate::catalog::PlaylistItem;
use crate::downloader::{DownloadProgress, DownloadRequest, DownloaderError, MediaDownloader};
use crate::error_log::{single_line, ErrorLog};
use crate::metrics;
use crate::progress::{ProgressEvent, ProgressHandle};
use crate::queue::WorkQueue;

use super::locks::KeyedLocks;
use super::types::{DownloadJob, JobOutcome, WorkerConfig};

/// Staging area under the target directory. Downloads land here first and
/// are renamed onto their artifact path only once complete.
pub const STAGING_DIR: &str = ".ingest-staging";

/// Drains a [`WorkQueue`] into local artifacts.
pub struct IngestionWorker<D: MediaDownloader> {
    config: WorkerConfig,
    downloader: Arc<D>,
    errors: ErrorLog,
    progress: ProgressHandle,
    locks: KeyedLocks,
}

impl<D: MediaDownloader + 'static> IngestionWorker<D> {
    /// Creates a worker that records failures in `errors`.
    pub fn new(config: WorkerConfig, downloader: D, errors: ErrorLog) -> Self {
        Self::with_shared_downloader(config, Arc::new(downloader), errors)
    }

    /// Creates a worker around an already shared downloader.
    pub fn with_shared_downloader(config: WorkerConfig, downloader: Arc<D>, errors: ErrorLog) -> Self {
        Self {
            config,
            downloader,
            errors,
            progress: ProgressHandle::disabled(),
            locks: KeyedLocks::new(),
        }
    }

    /// Sets the progress handle.
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Process every queued item.
    ///
    /// Returns the paths of completed and skipped artifacts in completion
    /// order. Failed items are recorded in the error log; cancelled and
    /// still-queued items are not reported.
    pub async fn process(&self, queue: &WorkQueue, cancel: &CancellationToken) -> Vec<PathBuf> {
        if let Err(e) = self.downloader.clear_cache().await {
            warn!("Failed to clear {} cache: {}", self.downloader.name(), e);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.target_dir).await {
            warn!(
                "Failed to create target directory {}: {}",
                self.config.target_dir.display(),
                e
            );
        }

        let total = queue.len();
        let limit = self.config.max_parallel_downloads.max(1);
        let completed = AtomicUsize::new(0);

        info!(
            "Processing {} items into {} ({} at a time)",
            total,
            self.config.target_dir.display(),
            limit
        );
        self.progress.emit(ProgressEvent::BatchStarted { total });

        let mut artifacts = Vec::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit && !cancel.is_cancelled() {
                match queue.dequeue() {
                    Some(item) => in_flight.push(self.process_item(item, total, &completed, cancel)),
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(outcome) => {
                    if let Some(path) = outcome.into_artifact() {
                        artifacts.push(path);
                    }
                }
                None => break,
            }
        }

        if cancel.is_cancelled() {
            info!(
                "Processing cancelled with {} items still queued",
                queue.len()
            );
        }

        info!(
            "Processed {} of {} items, {} artifacts available",
            completed.load(Ordering::SeqCst),
            total,
            artifacts.len()
        );

        artifacts
    }

    async fn process_item(
        &self,
        item: PlaylistItem,
        total: usize,
        completed: &AtomicUsize,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let file_name = artifact_file_name(&item.author, &item.title, self.downloader.codec());
        let job = DownloadJob {
            artifact_path: self.config.target_dir.join(&file_name),
            item,
        };

        self.progress.emit(ProgressEvent::ItemStarted {
            source_id: job.item.source_id.clone(),
            name: file_name.clone(),
        });

        // Items sharing a filename must not interleave check-then-download.
        let outcome = {
            let _guard = self.locks.lock(&file_name).await;
            self.run_job(&job, &file_name, cancel).await
        };

        if let JobOutcome::Failed(reason) = &outcome {
            warn!("Item {} failed: {}", job.item.source_id, reason);
            self.errors
                .push(format!(
                    "Error downloading {}: {}",
                    job.item.source_id,
                    single_line(reason)
                ))
                .await;
        }

        let status = outcome.status();
        metrics::ITEMS_PROCESSED
            .with_label_values(&[status.as_str()])
            .inc();

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.progress.emit(ProgressEvent::ItemFinished {
            source_id: job.item.source_id.clone(),
            completed: done,
            total,
            status,
        });

        outcome
    }

    async fn run_job(&self, job: &DownloadJob, file_name: &str, cancel: &CancellationToken) -> JobOutcome {
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        match tokio::fs::try_exists(&job.artifact_path).await {
            Ok(true) => {
                info!(
                    "Skipping {}: {} already exists",
                    job.item.source_id,
                    job.artifact_path.display()
                );
                return JobOutcome::Skipped(job.artifact_path.clone());
            }
            Ok(false) => {}
            Err(e) => {
                return JobOutcome::Failed(format!(
                    "failed to check {}: {}",
                    job.artifact_path.display(),
                    e
                ));
            }
        }

        let staging_dir = self
            .config
            .target_dir
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string());
        let request = DownloadRequest {
            source_id: job.item.source_id.clone(),
            source_url: format!("{}{}", self.config.source_url_prefix, job.item.source_id),
            output_path: staging_dir.join(file_name),
        };

        debug!(
            "Downloading {} from {}",
            job.item.source_id, request.source_url
        );

        let (progress_tx, mut progress_rx) = mpsc::channel::<DownloadProgress>(16);
        let progress = self.progress.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                progress.emit(ProgressEvent::DownloadProgress {
                    source_id: update.source_id,
                    downloaded_bytes: update.downloaded_bytes,
                    total_bytes: update.total_bytes,
                });
            }
        });

        let start = Instant::now();
        let result = tokio::select! {
            result = self.downloader.download(request, Some(progress_tx)) => result,
            _ = cancel.cancelled() => Err(DownloaderError::Cancelled),
        };
        let _ = forwarder.await;

        let outcome = match result {
            Ok(download) => match tokio::fs::rename(&download.output_path, &job.artifact_path).await {
                Ok(()) => {
                    info!(
                        "Downloaded {} to {} ({} bytes)",
                        job.item.source_id,
                        job.artifact_path.display(),
                        download.size_bytes
                    );
                    JobOutcome::Completed(job.artifact_path.clone())
                }
                Err(e) => JobOutcome::Failed(format!(
                    "failed to move {} into place: {}",
                    download.output_path.display(),
                    e
                )),
            },
            Err(DownloaderError::Cancelled) => {
                info!("Download of {} cancelled", job.item.source_id);
                JobOutcome::Cancelled
            }
            Err(e) => JobOutcome::Failed(e.to_string()),
        };

        let result_label = match &outcome {
            JobOutcome::Completed(_) => "success",
            JobOutcome::Cancelled => "cancelled",
            _ => "failed",
        };
        metrics::DOWNLOAD_DURATION
            .with_label_values(&[result_label])
            .observe(start.elapsed().as_secs_f64());

        remove_staging(&staging_dir).await;
        outcome
    }
}

async fn remove_staging(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staging dir {}: {}", dir.display(), e),
    }
}
