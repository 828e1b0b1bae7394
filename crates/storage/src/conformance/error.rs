use std::future::Future;

use super::{doc, entry, read, TestResult};
use crate::DocumentStore;

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "get_missing_returns_none",
            get_missing_returns_none(factory).await,
        ),
        TestResult::from_result(
            "error",
            "empty_document_is_stored",
            empty_document_is_stored(factory).await,
        ),
    ]
}

async fn get_missing_returns_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("nobody", "nothing")?;
    match store.get(&path).await {
        Ok(None) => Ok(()),
        Ok(Some(d)) => Err(format!("expected no document, got {d:?}")),
        Err(e) => Err(format!("expected Ok(None), got error: {e}")),
    }
}

/// A payload that carried only `ID` leaves an empty document, which must still
/// exist after the write.
async fn empty_document_is_stored<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u1", "bare")?;
    store
        .set(&path, doc(serde_json::json!({})))
        .await
        .map_err(|e| format!("set: {e}"))?;
    let stored = read(&store, &path).await?;
    if !stored.is_empty() {
        return Err(format!("expected empty document, got {stored:?}"));
    }
    Ok(())
}
