//! Pipeline orchestrator implementation.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::PlaylistCatalog;
use crate::downloader::MediaDownloader;
use crate::error_log::ErrorLog;
use crate::metrics;
use crate::progress::{ProgressEvent, ProgressHandle, Stage};
use crate::queue::WorkQueue;
use crate::storage::{ObjectStore, StorageError, StorageUploader, UploadDestination};
use crate::worker::IngestionWorker;

use super::types::{PipelineError, RunReport};

struct UploadStage<S: ObjectStore> {
    uploader: tokio::sync::Mutex<StorageUploader<S>>,
    destination: UploadDestination,
}

/// Drives one playlist through `Idle → Listing → Draining → Uploading → Done`.
///
/// `Uploading` is skipped when no uploader is attached. Failures of single
/// items end up in the error log; catalog and upload failures abort the run.
pub struct PipelineOrchestrator<C, D, S>
where
    C: PlaylistCatalog + 'static,
    D: MediaDownloader + 'static,
    S: ObjectStore + 'static,
{
    catalog: Arc<C>,
    worker: IngestionWorker<D>,
    upload: Option<UploadStage<S>>,
    progress: ProgressHandle,
    stage: Mutex<Stage>,
}

impl<C, D, S> PipelineOrchestrator<C, D, S>
where
    C: PlaylistCatalog + 'static,
    D: MediaDownloader + 'static,
    S: ObjectStore + 'static,
{
    /// Create an orchestrator without an upload stage.
    ///
    /// Catalog errors are recorded in the worker's error log.
    pub fn new(catalog: C, worker: IngestionWorker<D>) -> Self {
        Self::with_shared_catalog(Arc::new(catalog), worker)
    }

    pub fn with_shared_catalog(catalog: Arc<C>, worker: IngestionWorker<D>) -> Self {
        Self {
            catalog,
            worker,
            upload: None,
            progress: ProgressHandle::disabled(),
            stage: Mutex::new(Stage::Idle),
        }
    }

    /// Attach an upload stage.
    pub fn with_uploader(mut self, uploader: StorageUploader<S>, destination: UploadDestination) -> Self {
        self.upload = Some(UploadStage {
            uploader: tokio::sync::Mutex::new(uploader.with_progress(self.progress.clone())),
            destination,
        });
        self
    }

    /// Sets the progress handle for the orchestrator, worker and uploader.
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.worker = self.worker.with_progress(progress.clone());
        if let Some(stage) = self.upload.take() {
            self.upload = Some(UploadStage {
                uploader: tokio::sync::Mutex::new(
                    stage.uploader.into_inner().with_progress(progress.clone()),
                ),
                destination: stage.destination,
            });
        }
        self.progress = progress;
        self
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn errors(&self) -> &ErrorLog {
        self.worker.errors()
    }

    pub fn has_uploader(&self) -> bool {
        self.upload.is_some()
    }

    fn transition(&self, to: Stage) {
        let from = {
            let mut stage = self.stage.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *stage, to)
        };
        info!("Pipeline stage {} -> {}", from, to);
        self.progress.emit(ProgressEvent::StageChanged { from, to });
    }

    fn finish(&self, result: Result<RunReport, PipelineError>, started: Instant) -> Result<RunReport, PipelineError> {
        let label = match &result {
            Ok(_) => "done",
            Err(e) => e.kind(),
        };
        metrics::PIPELINE_RUNS.with_label_values(&[label]).inc();

        match &result {
            Ok(report) => info!(
                "Pipeline finished in {:.1}s: {} artifacts, {} uploaded, {} errors",
                started.elapsed().as_secs_f64(),
                report.artifacts.len(),
                report.uploaded.len(),
                report.errors.len()
            ),
            Err(PipelineError::Cancelled) => warn!("Pipeline cancelled in stage {}", self.stage()),
            Err(e) => error!("Pipeline failed in stage {}: {}", self.stage(), e),
        }

        result
    }

    /// Run the pipeline for `playlist_id`.
    ///
    /// Each run starts from `Idle` with an empty error log, so the report and
    /// [`errors`](Self::errors) only describe this run.
    pub async fn run(&self, playlist_id: &str, cancel: &CancellationToken) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let result = self.run_stages(playlist_id, cancel).await;
        self.finish(result, started)
    }

    async fn run_stages(&self, playlist_id: &str, cancel: &CancellationToken) -> Result<RunReport, PipelineError> {
        let errors = self.worker.errors();
        errors.clear().await;
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = Stage::Idle;

        self.transition(Stage::Listing);
        info!("Listing playlist {} via {}", playlist_id, self.catalog.name());
        let items = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self.catalog.list_playlist_items(playlist_id, errors) => result?,
        };

        let listed = items.len();
        let queue = WorkQueue::new();
        let queued = queue.enqueue_all(items);
        if queued < listed {
            info!("Queued {} items, {} duplicates dropped", queued, listed - queued);
        } else {
            info!("Queued {} items", queued);
        }

        self.transition(Stage::Draining);
        let artifacts = self.worker.process(&queue, cancel).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut uploaded = Vec::new();
        if let Some(stage) = &self.upload {
            self.transition(Stage::Uploading);

            let mut uploader = stage.uploader.lock().await;
            let before = uploader.uploaded().len();
            uploader.add_files(artifacts.iter().cloned());

            uploaded = match uploader.upload(&stage.destination, cancel).await {
                Ok(objects) => objects,
                Err(StorageError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(source) => {
                    return Err(PipelineError::Upload {
                        uploaded: uploader.uploaded()[before..].to_vec(),
                        source,
                    })
                }
            };
        }

        self.transition(Stage::Done);

        Ok(RunReport {
            listed,
            artifacts,
            uploaded,
            errors: errors.entries().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::testing::{fixtures, MockCatalog, MockDownloader, MockObjectStore};
    use crate::worker::WorkerConfig;
    use tempfile::TempDir;

    type TestOrchestrator = PipelineOrchestrator<MockCatalog, MockDownloader, MockObjectStore>;

    fn orchestrator(temp: &TempDir, catalog: MockCatalog, downloader: MockDownloader) -> TestOrchestrator {
        let worker = IngestionWorker::new(
            WorkerConfig {
                target_dir: temp.path().to_path_buf(),
                ..Default::default()
            },
            downloader,
            ErrorLog::new(),
        );
        PipelineOrchestrator::new(catalog, worker)
    }

    #[tokio::test]
    async fn test_run_without_uploader_skips_upload_stage() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(2)).await;
        let (progress, mut rx) = ProgressHandle::channel(256);
        let pipeline = orchestrator(&temp, catalog, MockDownloader::new()).with_progress(progress);

        let report = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();

        assert_eq!(report.listed, 2);
        assert_eq!(report.artifacts.len(), 2);
        assert!(report.uploaded.is_empty());
        assert_eq!(pipeline.stage(), Stage::Done);

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::StageChanged { to, .. } = event {
                stages.push(to);
            }
        }
        assert_eq!(stages, vec![Stage::Listing, Stage::Draining, Stage::Done]);
    }

    #[tokio::test]
    async fn test_run_with_uploader_passes_through_uploading() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(2)).await;
        let store = MockObjectStore::new();
        let (progress, mut rx) = ProgressHandle::channel(256);
        let pipeline = orchestrator(&temp, catalog, MockDownloader::new())
            .with_progress(progress)
            .with_uploader(
                StorageUploader::new(store.clone()),
                UploadDestination::new("bucket", "music"),
            );

        let report = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();

        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(
            store.keys().await,
            vec![
                "music/Artist 1 - Track 1.mp3".to_string(),
                "music/Artist 2 - Track 2.mp3".to_string()
            ]
        );

        let mut stages = Vec::new();
        let mut upload_events = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::StageChanged { to, .. } => stages.push(to),
                ProgressEvent::UploadFileFinished { .. } => upload_events += 1,
                _ => {}
            }
        }
        assert_eq!(
            stages,
            vec![Stage::Listing, Stage::Draining, Stage::Uploading, Stage::Done]
        );
        assert_eq!(upload_events, 2);
    }

    #[tokio::test]
    async fn test_duplicates_are_downloaded_once() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        let mut items = fixtures::playlist(2);
        items.push(fixtures::playlist_item(1));
        catalog.set_items(items).await;
        let downloader = MockDownloader::new();
        let calls = downloader.clone();
        let pipeline = orchestrator(&temp, catalog, downloader);

        let report = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();

        assert_eq!(report.listed, 3);
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(calls.download_count().await, 2);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog
            .set_next_error(CatalogError::Api {
                status: 500,
                message: "backend error".to_string(),
            })
            .await;
        let downloader = MockDownloader::new();
        let calls = downloader.clone();
        let pipeline = orchestrator(&temp, catalog, downloader);

        let result = pipeline.run("PL1", &CancellationToken::new()).await;

        assert!(matches!(result, Err(PipelineError::Catalog(_))));
        assert_eq!(pipeline.stage(), Stage::Listing);
        assert_eq!(calls.download_count().await, 0);
    }

    #[tokio::test]
    async fn test_catalog_errors_appear_in_report() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(1)).await;
        catalog.report_error("Catalog error 403: quota exceeded").await;
        let downloader = MockDownloader::new();
        downloader.fail_for("video1", "boom").await;
        let pipeline = orchestrator(&temp, catalog, downloader);

        let report = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();

        assert_eq!(
            report.errors,
            vec![
                "Catalog error 403: quota exceeded".to_string(),
                "Error downloading video1: Download failed: boom".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_reports_partial_progress() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(3)).await;
        let store = MockObjectStore::new();
        store.fail_on_call(2).await;
        let pipeline = orchestrator(&temp, catalog, MockDownloader::new()).with_uploader(
            StorageUploader::new(store.clone()),
            UploadDestination::new("bucket", ""),
        );

        let result = pipeline.run("PL1", &CancellationToken::new()).await;

        match result {
            Err(PipelineError::Upload { uploaded, source }) => {
                assert_eq!(uploaded.len(), 1);
                assert!(matches!(source, StorageError::Rejected { status: 503, .. }));
            }
            other => panic!("expected upload failure, got {:?}", other),
        }
        assert_eq!(store.put_count().await, 2);
        assert_eq!(pipeline.stage(), Stage::Uploading);
    }

    #[tokio::test]
    async fn test_second_run_starts_from_idle_with_fresh_errors() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(2)).await;
        let downloader = MockDownloader::new();
        downloader.fail_for("video1", "boom").await;
        let (progress, mut rx) = ProgressHandle::channel(256);
        let pipeline = orchestrator(&temp, catalog, downloader).with_progress(progress);

        let first = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();
        while rx.try_recv().is_ok() {}
        let second = pipeline.run("PL1", &CancellationToken::new()).await.unwrap();

        let expected = vec!["Error downloading video1: Download failed: boom".to_string()];
        assert_eq!(first.errors, expected);
        assert_eq!(second.errors, expected);
        assert_eq!(pipeline.errors().entries().await, expected);

        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::StageChanged { from, to } = event {
                transitions.push((from, to));
            }
        }
        assert_eq!(
            transitions,
            vec![
                (Stage::Idle, Stage::Listing),
                (Stage::Listing, Stage::Draining),
                (Stage::Draining, Stage::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_listing() {
        let temp = TempDir::new().unwrap();
        let catalog = MockCatalog::new();
        catalog.set_items(fixtures::playlist(1)).await;
        let pipeline = orchestrator(&temp, catalog.clone(), MockDownloader::new());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pipeline.run("PL1", &cancel).await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(catalog.recorded_requests().await.is_empty());
    }
}
