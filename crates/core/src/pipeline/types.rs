//! Types for the pipeline orchestrator.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::storage::{StorageError, UploadedObject};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Playlist enumeration failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Upload stage failed; `uploaded` lists what reached the store first.
    #[error("upload failed after {} objects: {source}", .uploaded.len())]
    Upload {
        uploaded: Vec<UploadedObject>,
        #[source]
        source: StorageError,
    },

    /// Run was cancelled.
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Metric label for this outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Catalog(_) => "catalog_failed",
            PipelineError::Upload { .. } => "upload_failed",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Playlist members returned by the catalog.
    pub listed: usize,
    /// Completed and skipped artifacts, in completion order.
    pub artifacts: Vec<PathBuf>,
    /// Objects uploaded by this run; empty when no uploader is configured.
    pub uploaded: Vec<UploadedObject>,
    /// Recoverable failures, in the order they were recorded.
    pub errors: Vec<String>,
}
