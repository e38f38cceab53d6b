//! End-to-end pipeline run.
//!
//! The orchestrator composes the components left to right:
//! - **Listing**: the catalog enumerates the playlist into a [`WorkQueue`](crate::queue::WorkQueue)
//! - **Draining**: the ingestion worker turns queued items into local artifacts
//! - **Uploading**: artifacts are streamed to object storage, when configured

mod orchestrator;
mod types;

pub use orchestrator::PipelineOrchestrator;
pub use types::{PipelineError, RunReport};
