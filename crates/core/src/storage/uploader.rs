//! Batch uploader.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::StorageError;
use super::traits::ObjectStore;
use super::types::{ObjectAcl, PutObjectRequest, UploadDestination, UploadedObject};
use crate::downloader::AudioCodec;
use crate::metrics;
use crate::progress::{ProgressEvent, ProgressHandle};

/// Content type for artifacts whose extension is not a known audio codec.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// `"<directory>/<basename>"`, or just the basename for an empty directory.
pub fn object_key(directory: &str, local_path: &Path) -> String {
    let basename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let directory = directory.trim_matches('/');

    if directory.is_empty() {
        basename
    } else {
        format!("{}/{}", directory, basename)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(AudioCodec::from_extension)
        .map(|codec| codec.content_type())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Streams staged artifacts to an [`ObjectStore`], strictly in staging order.
///
/// The first failed upload stops the batch; the failed file and everything
/// after it stay staged, so a later [`upload`](Self::upload) resumes there.
pub struct StorageUploader<S: ObjectStore> {
    store: Arc<S>,
    staged: VecDeque<PathBuf>,
    uploaded: Vec<UploadedObject>,
    acl: ObjectAcl,
    progress: ProgressHandle,
}

impl<S: ObjectStore + 'static> StorageUploader<S> {
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            staged: VecDeque::new(),
            uploaded: Vec::new(),
            acl: ObjectAcl::default(),
            progress: ProgressHandle::disabled(),
        }
    }

    /// Sets the progress handle.
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// Overrides the canned ACL (default `public-read`).
    pub fn with_acl(mut self, acl: ObjectAcl) -> Self {
        self.acl = acl;
        self
    }

    /// Stage one artifact.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.staged.push_back(path.into());
    }

    /// Stage several artifacts, preserving order.
    pub fn add_files<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.staged.extend(paths.into_iter().map(Into::into));
    }

    /// Artifacts waiting to be uploaded.
    pub fn staged(&self) -> impl Iterator<Item = &PathBuf> {
        self.staged.iter()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Every object uploaded by this uploader so far.
    pub fn uploaded(&self) -> &[UploadedObject] {
        &self.uploaded
    }

    /// Upload staged artifacts in order.
    ///
    /// Returns the objects uploaded by this call. Stops at the first error,
    /// which is returned; nothing after the failing file is attempted.
    /// Cancellation is honored between files.
    pub async fn upload(
        &mut self,
        destination: &UploadDestination,
        cancel: &CancellationToken,
    ) -> Result<Vec<UploadedObject>, StorageError> {
        let total = self.staged.len();
        let mut batch = Vec::with_capacity(total);

        info!(
            "Uploading {} files to {} bucket {} under '{}'",
            total,
            self.store.name(),
            destination.bucket,
            destination.directory
        );
        self.progress.emit(ProgressEvent::UploadStarted { total });

        while let Some(path) = self.staged.front().cloned() {
            if cancel.is_cancelled() {
                info!("Upload cancelled with {} files still staged", self.staged.len());
                return Err(StorageError::Cancelled);
            }

            let object = match self.upload_one(&path, destination).await {
                Ok(object) => object,
                Err(e) => {
                    metrics::UPLOADS_TOTAL.with_label_values(&["failed"]).inc();
                    error!("Upload of {} failed: {}", path.display(), e);
                    return Err(e);
                }
            };

            self.staged.pop_front();
            metrics::UPLOADS_TOTAL.with_label_values(&["success"]).inc();
            metrics::UPLOADED_BYTES.inc_by(object.size_bytes);

            batch.push(object.clone());
            self.uploaded.push(object.clone());

            self.progress.emit(ProgressEvent::UploadFileFinished {
                key: object.key,
                path: object.local_path,
                completed: batch.len(),
                total,
            });
        }

        info!("Uploaded {} files", batch.len());
        Ok(batch)
    }

    async fn upload_one(
        &self,
        path: &Path,
        destination: &UploadDestination,
    ) -> Result<UploadedObject, StorageError> {
        let key = object_key(&destination.directory, path);
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::io(path, e))?
            .len();

        debug!("Uploading {} as {} ({} bytes)", path.display(), key, size_bytes);
        self.progress.emit(ProgressEvent::UploadFileStarted {
            key: key.clone(),
            size_bytes,
        });

        let (progress_tx, mut progress_rx) = mpsc::channel::<u64>(16);
        let progress = self.progress.clone();
        let progress_key = key.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(sent_bytes) = progress_rx.recv().await {
                progress.emit(ProgressEvent::UploadProgress {
                    key: progress_key.clone(),
                    sent_bytes,
                    total_bytes: size_bytes,
                });
            }
        });

        let request = PutObjectRequest {
            bucket: destination.bucket.clone(),
            key: key.clone(),
            local_path: path.to_path_buf(),
            size_bytes,
            content_type: content_type_for(path).to_string(),
            acl: self.acl,
        };
        let result = self.store.put_object(request, Some(progress_tx)).await;
        forwarder.abort();
        result?;

        Ok(UploadedObject {
            key,
            local_path: path.to_path_buf(),
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockObjectStore;
    use tempfile::TempDir;

    fn write_files(temp: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = temp.path().join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_object_key_with_directory() {
        assert_eq!(
            object_key("music/2024", Path::new("/tmp/x/Band - Song.mp3")),
            "music/2024/Band - Song.mp3"
        );
    }

    #[test]
    fn test_object_key_trims_slashes_and_handles_empty() {
        assert_eq!(
            object_key("/music/", Path::new("/tmp/Band - Song.mp3")),
            "music/Band - Song.mp3"
        );
        assert_eq!(
            object_key("", Path::new("/tmp/Band - Song.mp3")),
            "Band - Song.mp3"
        );
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a.flac")), "audio/flac");
        assert_eq!(content_type_for(Path::new("a.bin")), DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_uploads_in_staging_order() {
        let temp = TempDir::new().unwrap();
        let files = write_files(&temp, &["A - 1.mp3", "B - 2.mp3", "C - 3.mp3"]);
        let store = MockObjectStore::new();
        let mut uploader = StorageUploader::new(store.clone());
        uploader.add_files(files.clone());

        let destination = UploadDestination::new("bucket", "music/2024");
        let uploaded = uploader
            .upload(&destination, &CancellationToken::new())
            .await
            .unwrap();

        let keys: Vec<&str> = uploaded.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["music/2024/A - 1.mp3", "music/2024/B - 2.mp3", "music/2024/C - 3.mp3"]
        );
        assert_eq!(uploaded[0].size_bytes, "A - 1.mp3".len() as u64);
        assert_eq!(uploader.staged_len(), 0);

        let puts = store.recorded_puts().await;
        assert_eq!(puts.len(), 3);
        assert_eq!(puts[0].bucket, "bucket");
        assert_eq!(puts[0].content_type, "audio/mpeg");
        assert_eq!(puts[0].acl, ObjectAcl::PublicRead);
        assert_eq!(
            store.object("music/2024/B - 2.mp3").await.unwrap(),
            b"B - 2.mp3".to_vec()
        );
    }

    #[tokio::test]
    async fn test_failure_halts_batch_and_keeps_remaining_staged() {
        let temp = TempDir::new().unwrap();
        let files = write_files(&temp, &["1.mp3", "2.mp3", "3.mp3", "4.mp3", "5.mp3"]);
        let store = MockObjectStore::new();
        store.fail_on_call(2).await;
        let mut uploader = StorageUploader::new(store.clone());
        uploader.add_files(files.clone());

        let destination = UploadDestination::new("bucket", "");
        let result = uploader.upload(&destination, &CancellationToken::new()).await;

        assert!(matches!(result, Err(StorageError::Rejected { .. })));
        assert_eq!(store.put_count().await, 2);
        assert_eq!(uploader.uploaded().len(), 1);
        let staged: Vec<&PathBuf> = uploader.staged().collect();
        assert_eq!(staged, files[1..].iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_resume_after_failure() {
        let temp = TempDir::new().unwrap();
        let files = write_files(&temp, &["1.mp3", "2.mp3"]);
        let store = MockObjectStore::new();
        store.fail_on_call(1).await;
        let mut uploader = StorageUploader::new(store.clone());
        uploader.add_files(files);

        let destination = UploadDestination::new("bucket", "d");
        assert!(uploader
            .upload(&destination, &CancellationToken::new())
            .await
            .is_err());

        let uploaded = uploader
            .upload(&destination, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(uploaded.len(), 2);
        assert_eq!(uploader.uploaded().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let mut uploader = StorageUploader::new(MockObjectStore::new());
        uploader.add_file("/nonexistent/a.mp3");

        let result = uploader
            .upload(&UploadDestination::new("b", ""), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(uploader.staged_len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_file() {
        let temp = TempDir::new().unwrap();
        let files = write_files(&temp, &["1.mp3"]);
        let store = MockObjectStore::new();
        let mut uploader = StorageUploader::new(store.clone());
        uploader.add_files(files);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = uploader.upload(&UploadDestination::new("b", ""), &cancel).await;

        assert!(matches!(result, Err(StorageError::Cancelled)));
        assert_eq!(store.put_count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let temp = TempDir::new().unwrap();
        let files = write_files(&temp, &["1.mp3", "2.mp3"]);
        let (progress, mut rx) = ProgressHandle::channel(64);
        let mut uploader = StorageUploader::new(MockObjectStore::new()).with_progress(progress);
        uploader.add_files(files);

        uploader
            .upload(&UploadDestination::new("b", "d"), &CancellationToken::new())
            .await
            .unwrap();

        let mut finished = Vec::new();
        let mut started = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ProgressEvent::UploadStarted { total } => started = Some(total),
                ProgressEvent::UploadFileFinished {
                    completed, total, ..
                } => finished.push((completed, total)),
                _ => {}
            }
        }
        assert_eq!(started, Some(2));
        assert_eq!(finished, vec![(1, 2), (2, 2)]);
    }
}
