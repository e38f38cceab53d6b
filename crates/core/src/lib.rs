pub mod artifact;
pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error_log;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod storage;
pub mod testing;
pub mod worker;

pub use artifact::{artifact_file_name, artifact_path};
pub use catalog::{CatalogError, PlaylistCatalog, PlaylistItem, YoutubeCatalogClient};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use downloader::{AudioCodec, DownloaderError, MediaDownloader, YtDlpDownloader};
pub use error_log::ErrorLog;
pub use pipeline::{PipelineError, PipelineOrchestrator, RunReport};
pub use progress::{ItemStatus, ProgressEvent, ProgressHandle, Stage};
pub use queue::WorkQueue;
pub use storage::{
    CredentialSource, ObjectStore, S3ObjectStore, StorageError, StorageUploader,
    UploadDestination, UploadedObject,
};
pub use worker::{IngestionWorker, WorkerConfig};
