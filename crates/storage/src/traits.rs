use async_trait::async_trait;

use crate::error::StorageError;
use crate::path::{Document, DocumentPath};

/// A keyed document store addressed by hierarchical paths.
///
/// ## Write semantics
///
/// `set` is a full-document replace: after it returns `Ok`, the document at
/// `path` is exactly `document`, with no fields carried over from any earlier
/// value. Applying the same `set` twice leaves the same state as applying it
/// once. A failed `set` must not leave a partially written document behind.
///
/// There is no ordering guarantee between concurrent writers to the same
/// path: the last write to land wins.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Create or fully replace the document at `path`.
    async fn set(&self, path: &DocumentPath, document: Document) -> Result<(), StorageError>;

    /// Read the document at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError>;

    /// Short name used in logs (`"memory"`, `"firestore"`).
    fn backend_name(&self) -> &str;
}
