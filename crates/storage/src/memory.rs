use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::path::{Document, DocumentPath};
use crate::traits::DocumentStore;

/// In-process document store keyed by the rendered path.
///
/// Each `set` swaps the whole value under the write lock, so readers see
/// either the previous document or the new one, never a mix.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail with `StorageError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `set` calls that reached the backend, successful or not.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn set(&self, path: &DocumentPath, document: Document) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store is rejecting writes".to_string(),
            ));
        }
        self.documents
            .write()
            .await
            .insert(path.to_string(), document);
        Ok(())
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError> {
        Ok(self.documents.read().await.get(&path.to_string()).cloned())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
