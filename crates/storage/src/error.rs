/// All errors that can be returned by a DocumentStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A path segment cannot be used as a collection or document ID.
    #[error("invalid document path segment {segment:?}: {reason}")]
    InvalidPath { segment: String, reason: &'static str },

    /// The backend could not be reached or is temporarily refusing work
    /// (connectivity, quota, 5xx). Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend understood the request and refused it permanently.
    #[error("storage rejected write to {path}: {message}")]
    Rejected { path: String, message: String },

    /// A backend-specific storage error (serialization, task join, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether a later attempt with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StorageError::Unavailable("quota".into()).is_retryable());
        assert!(StorageError::Backend("join".into()).is_retryable());
        assert!(!StorageError::Rejected {
            path: "users/u/timeline/a".into(),
            message: "bad value".into(),
        }
        .is_retryable());
        assert!(!StorageError::InvalidPath {
            segment: "a/b".into(),
            reason: "contains '/'",
        }
        .is_retryable());
    }
}
