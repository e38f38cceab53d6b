//! Trait definitions for the storage module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::StorageError;
use super::types::PutObjectRequest;

/// A remote object store accepting streaming uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Streams `request.local_path` to `request.bucket`/`request.key`.
    ///
    /// `progress_tx` receives the cumulative number of bytes sent. Sends never
    /// block; a lagging receiver misses intermediate values.
    async fn put_object(
        &self,
        request: PutObjectRequest,
        progress_tx: Option<mpsc::Sender<u64>>,
    ) -> Result<(), StorageError>;
}
