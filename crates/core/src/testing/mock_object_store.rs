//! Mock object store for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::storage::{ObjectStore, PutObjectRequest, StorageError};

/// Mock implementation of the ObjectStore trait.
///
/// Reads the local file like a real upload would and keeps its bytes in
/// memory, keyed by object key.
#[derive(Debug, Clone, Default)]
pub struct MockObjectStore {
    /// Every put attempted, in order, including failed ones.
    puts: Arc<RwLock<Vec<PutObjectRequest>>>,
    /// Stored object bodies by key.
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// 1-based put attempts that fail.
    failing_calls: Arc<RwLock<HashSet<usize>>>,
    /// Keys whose puts fail.
    failing_keys: Arc<RwLock<HashSet<String>>>,
}

impl MockObjectStore {
    /// Create a new empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th put attempt (1-based) fail.
    pub async fn fail_on_call(&self, n: usize) {
        self.failing_calls.write().await.insert(n);
    }

    /// Make every put of `key` fail.
    pub async fn fail_for_key(&self, key: impl Into<String>) {
        self.failing_keys.write().await.insert(key.into());
    }

    /// All put attempts, in order.
    pub async fn recorded_puts(&self) -> Vec<PutObjectRequest> {
        self.puts.read().await.clone()
    }

    /// Number of put attempts.
    pub async fn put_count(&self) -> usize {
        self.puts.read().await.len()
    }

    /// Keys stored so far.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Body of a stored object.
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        progress_tx: Option<mpsc::Sender<u64>>,
    ) -> Result<(), StorageError> {
        let attempt = {
            let mut puts = self.puts.write().await;
            puts.push(request.clone());
            puts.len()
        };

        let fails = self.failing_calls.read().await.contains(&attempt)
            || self.failing_keys.read().await.contains(&request.key);
        if fails {
            return Err(StorageError::Rejected {
                key: request.key,
                status: 503,
                message: "SlowDown: Please reduce your request rate.".to_string(),
            });
        }

        let body = tokio::fs::read(&request.local_path)
            .await
            .map_err(|e| StorageError::io(&request.local_path, e))?;

        if let Some(tx) = progress_tx {
            let _ = tx.try_send(body.len() as u64);
        }

        self.objects.write().await.insert(request.key, body);
        Ok(())
    }
}
