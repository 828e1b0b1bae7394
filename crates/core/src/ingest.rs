//! Idempotent ingestion of authenticated deliveries.

use std::sync::Arc;
use std::time::Duration;

use timeline_storage::{DocumentPath, DocumentStore, StorageError};

use crate::envelope::{ActivityDelivery, PushEnvelope};
use crate::error::IngestError;

/// Upper bound on a single storage write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// What was written for a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: DocumentPath,
    pub uid: String,
    pub activity_id: String,
    pub message_id: Option<String>,
    /// Number of top-level fields stored.
    pub field_count: usize,
}

/// Writes activity deliveries into `users/{uid}/timeline/{activity_id}`.
///
/// Every write is a full replace at a path derived only from the delivery
/// itself, so redelivery of the same envelope converges on the same stored
/// value and concurrent deliveries need no coordination. There is no
/// read-before-write.
#[derive(Clone)]
pub struct TimelineWriter {
    store: Arc<dyn DocumentStore>,
    write_timeout: Duration,
}

impl TimelineWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Decode a request body without touching storage.
    pub fn decode(body: &[u8]) -> Result<ActivityDelivery, IngestError> {
        ActivityDelivery::from_envelope(PushEnvelope::from_slice(body)?)
    }

    /// Decode a request body and upsert the activity it carries.
    pub async fn ingest(&self, body: &[u8]) -> Result<WriteReceipt, IngestError> {
        let delivery = Self::decode(body)?;
        self.write(delivery).await
    }

    pub async fn write(&self, delivery: ActivityDelivery) -> Result<WriteReceipt, IngestError> {
        let ActivityDelivery {
            uid,
            activity_id,
            path,
            record,
            message_id,
            subscription,
            publish_time,
        } = delivery;
        let field_count = record.len();

        match tokio::time::timeout(self.write_timeout, self.store.set(&path, record)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(storage_failure(&path, err)),
            Err(_) => {
                return Err(IngestError::StorageUnavailable(format!(
                    "write to {} timed out after {}ms",
                    path,
                    self.write_timeout.as_millis()
                )))
            }
        }

        tracing::info!(
            uid = %uid,
            activity_id = %activity_id,
            message_id = message_id.as_deref().unwrap_or(""),
            subscription = subscription.as_deref().unwrap_or(""),
            published = publish_time.as_deref().unwrap_or(""),
            backend = self.store.backend_name(),
            "timeline entry written"
        );

        Ok(WriteReceipt {
            path,
            uid,
            activity_id,
            message_id,
            field_count,
        })
    }
}

fn storage_failure(path: &DocumentPath, err: StorageError) -> IngestError {
    match err {
        // The backend refused this value outright; retrying cannot help.
        StorageError::Rejected { message, .. } => {
            IngestError::MalformedPayload(format!("{} rejected by storage: {}", path, message))
        }
        StorageError::InvalidPath { .. } => IngestError::MalformedPayload(err.to_string()),
        StorageError::Unavailable(_) | StorageError::Backend(_) => {
            IngestError::StorageUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde_json::json;
    use timeline_storage::{Document, InMemoryDocumentStore};

    use super::*;

    fn body(payload: serde_json::Value, uid: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "message": {
                "data": BASE64.encode(payload.to_string()),
                "attributes": {"uid": uid},
                "messageId": "m-9"
            }
        }))
        .unwrap()
    }

    /// Never finishes a write.
    struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn set(&self, _: &DocumentPath, _: Document) -> Result<(), StorageError> {
            std::future::pending().await
        }

        async fn get(&self, _: &DocumentPath) -> Result<Option<Document>, StorageError> {
            Ok(None)
        }

        fn backend_name(&self) -> &str {
            "stalled"
        }
    }

    struct RejectingStore;

    #[async_trait]
    impl DocumentStore for RejectingStore {
        async fn set(&self, path: &DocumentPath, _: Document) -> Result<(), StorageError> {
            Err(StorageError::Rejected {
                path: path.to_string(),
                message: "nested arrays are not supported".to_string(),
            })
        }

        async fn get(&self, _: &DocumentPath) -> Result<Option<Document>, StorageError> {
            Ok(None)
        }

        fn backend_name(&self) -> &str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn stores_payload_without_id() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let writer = TimelineWriter::new(store.clone());

        let receipt = writer
            .ingest(&body(json!({"ID": "a1", "text": "hi"}), "u42"))
            .await
            .unwrap();
        assert_eq!(receipt.path.to_string(), "users/u42/timeline/a1");
        assert_eq!(receipt.field_count, 1);
        assert_eq!(receipt.message_id.as_deref(), Some("m-9"));

        let stored = store.get(&receipt.path).await.unwrap().unwrap();
        assert_eq!(serde_json::Value::Object(stored), json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let writer = TimelineWriter::new(store.clone());
        let delivery = body(json!({"ID": "a1", "text": "hi", "n": 2}), "u42");

        let first = writer.ingest(&delivery).await.unwrap();
        let after_first = store.get(&first.path).await.unwrap();
        let second = writer.ingest(&delivery).await.unwrap();
        let after_second = store.get(&second.path).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn later_delivery_replaces_whole_record() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let writer = TimelineWriter::new(store.clone());

        writer
            .ingest(&body(json!({"ID": "a1", "text": "hi", "likes": 4}), "u42"))
            .await
            .unwrap();
        let receipt = writer
            .ingest(&body(json!({"ID": "a1", "text": "edited"}), "u42"))
            .await
            .unwrap();

        let stored = store.get(&receipt.path).await.unwrap().unwrap();
        assert_eq!(serde_json::Value::Object(stored), json!({"text": "edited"}));
    }

    #[tokio::test]
    async fn malformed_payload_never_touches_storage() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let writer = TimelineWriter::new(store.clone());

        let err = writer
            .ingest(&body(json!({"text": "no id"}), "u42"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingActivityId(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn storage_outage_is_retryable() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.fail_writes(true);
        let writer = TimelineWriter::new(store.clone());

        let err = writer
            .ingest(&body(json!({"ID": "a1", "text": "hi"}), "u42"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn slow_write_times_out_as_unavailable() {
        let writer = TimelineWriter::new(Arc::new(StalledStore))
            .with_write_timeout(Duration::from_millis(20));

        let err = writer
            .ingest(&body(json!({"ID": "a1"}), "u42"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::StorageUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn storage_rejection_is_not_retryable() {
        let writer = TimelineWriter::new(Arc::new(RejectingStore));
        let err = writer
            .ingest(&body(json!({"ID": "a1", "grid": [[1]]}), "u42"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedPayload(_)));
        assert!(!err.is_retryable());
    }
}
