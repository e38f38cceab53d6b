//! Ingestion worker: drains the work queue into local audio artifacts.
//!
//! For every queued item the worker derives the artifact path, skips the
//! item if the artifact already exists, and otherwise downloads into a
//! private staging directory before renaming onto the final path. Failures
//! are recorded in the run's [`ErrorLog`](crate::error_log::ErrorLog) and
//! never stop the batch.
//!
//! # Example
//!
//! ```ignore
//! use playlist_ingest_core::worker::{IngestionWorker, WorkerConfig};
//!
//! let worker = IngestionWorker::new(WorkerConfig::from(&config.downloader), downloader, errors.clone())
//!     .with_progress(progress.clone());
//! let artifacts = worker.process(&queue, &cancel).await;
//! ```

mod ingestion;
mod locks;
mod types;

pub use ingestion::{IngestionWorker, STAGING_DIR};
pub use types::{DownloadJob, JobOutcome, WorkerConfig};
