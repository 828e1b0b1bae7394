//! Conformance test suite for `DocumentStore` implementations.
//!
//! A backend-agnostic suite that any `DocumentStore` can run to verify the
//! write semantics the timeline writer depends on:
//!
//! - **Replace**: `set` replaces the whole document, never merges
//! - **Idempotence**: redelivering the same write leaves the same state
//! - **Isolation**: writes to one path never touch another
//! - **Concurrency**: racing writers leave exactly one complete value
//! - **Error handling**: reads of missing documents, empty documents
//!
//! # Usage
//!
//! ```ignore
//! use timeline_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn emulator_conformance() {
//!     let report = run_conformance_suite(|| async { emulator_store().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod idempotent;
mod isolation;
mod replace;

use std::fmt;
use std::future::Future;

use crate::{Document, DocumentPath, DocumentStore};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "replace", "concurrent").
    pub category: String,
    /// Test name (e.g. "set_replaces_all_fields").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, so tests never observe each other's documents.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(replace::run_replace_tests(&factory).await);
    results.extend(idempotent::run_idempotent_tests(&factory).await);
    results.extend(isolation::run_isolation_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn entry(uid: &str, activity_id: &str) -> Result<DocumentPath, String> {
    DocumentPath::timeline_entry(uid, activity_id).map_err(|e| format!("path: {e}"))
}

fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = Document::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

async fn read<S: DocumentStore>(store: &S, path: &DocumentPath) -> Result<Document, String> {
    store
        .get(path)
        .await
        .map_err(|e| format!("get {path}: {e}"))?
        .ok_or_else(|| format!("expected a document at {path}"))
}
