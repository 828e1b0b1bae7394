mod error;
mod firestore;
mod memory;
mod path;
mod traits;

pub mod conformance;

pub use error::StorageError;
pub use firestore::{encode_document, encode_value, FirestoreConfig, FirestoreCredentials, FirestoreStore};
pub use memory::InMemoryDocumentStore;
pub use path::{validate_segment, Document, DocumentPath, MAX_SEGMENT_BYTES};
pub use traits::DocumentStore;
