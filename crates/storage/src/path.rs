use std::fmt;

use crate::error::StorageError;

/// A stored document body. Field order is not significant.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Maximum size of a single collection or document ID, in bytes.
pub const MAX_SEGMENT_BYTES: usize = 1500;

/// A hierarchical document address: `collection/doc/collection/doc/...`.
///
/// Segments alternate between collection IDs and document IDs, so a valid
/// document path always has an even, non-zero number of segments. Each
/// segment is validated on construction; a path that exists at all is safe to
/// hand to any backend and maps to exactly one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Build a path from alternating collection / document segments.
    pub fn new<I, S>(segments: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.len() % 2 != 0 {
            return Err(StorageError::InvalidPath {
                segment: segments.join("/"),
                reason: "document paths need an even, non-zero number of segments",
            });
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    /// `users/{uid}/timeline/{activity_id}`
    pub fn timeline_entry(uid: &str, activity_id: &str) -> Result<Self, StorageError> {
        Self::new(["users", uid, "timeline", activity_id])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final (document ID) segment.
    pub fn document_id(&self) -> &str {
        // Construction guarantees at least two segments.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Check a single collection or document ID against Firestore's naming rules.
pub fn validate_segment(segment: &str) -> Result<(), StorageError> {
    let reason = if segment.is_empty() {
        Some("empty segment")
    } else if segment.contains('/') {
        Some("contains '/'")
    } else if segment == "." || segment == ".." {
        Some("reserved relative name")
    } else if segment.len() >= 4 && segment.starts_with("__") && segment.ends_with("__") {
        Some("reserved '__name__' form")
    } else if segment.len() > MAX_SEGMENT_BYTES {
        Some("longer than 1500 bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidPath {
            segment: segment.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_entry_layout() {
        let path = DocumentPath::timeline_entry("u42", "a1").unwrap();
        assert_eq!(path.to_string(), "users/u42/timeline/a1");
        assert_eq!(path.document_id(), "a1");
        assert_eq!(path.segments().len(), 4);
    }

    #[test]
    fn slash_in_segment_is_rejected() {
        let err = DocumentPath::timeline_entry("u42/timeline/x", "a1").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
    }

    #[test]
    fn reserved_and_empty_segments_are_rejected() {
        for bad in ["", ".", "..", "__id__"] {
            assert!(
                DocumentPath::timeline_entry("u42", bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
        // Underscores alone are fine.
        assert!(DocumentPath::timeline_entry("u42", "__").is_ok());
        assert!(DocumentPath::timeline_entry("u42", "__a").is_ok());
    }

    #[test]
    fn oversized_segment_is_rejected() {
        let long = "x".repeat(MAX_SEGMENT_BYTES + 1);
        assert!(DocumentPath::timeline_entry(&long, "a1").is_err());
        let max = "x".repeat(MAX_SEGMENT_BYTES);
        assert!(DocumentPath::timeline_entry(&max, "a1").is_ok());
    }

    #[test]
    fn odd_segment_count_is_rejected() {
        assert!(DocumentPath::new(["users", "u42", "timeline"]).is_err());
        assert!(DocumentPath::new(Vec::<String>::new()).is_err());
    }
}
