use std::future::Future;

use serde_json::json;

use super::{doc, entry, read, TestResult};
use crate::DocumentStore;

pub(super) async fn run_replace_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "replace",
            "set_creates_document",
            set_creates_document(factory).await,
        ),
        TestResult::from_result(
            "replace",
            "set_replaces_all_fields",
            set_replaces_all_fields(factory).await,
        ),
        TestResult::from_result(
            "replace",
            "nested_values_preserved",
            nested_values_preserved(factory).await,
        ),
    ]
}

async fn set_creates_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u42", "a1")?;
    let value = doc(json!({"text": "hi"}));

    store
        .set(&path, value.clone())
        .await
        .map_err(|e| format!("set: {e}"))?;

    let stored = read(&store, &path).await?;
    if stored != value {
        return Err(format!("expected {value:?}, got {stored:?}"));
    }
    Ok(())
}

/// A second write with fewer fields must drop the fields it does not carry.
async fn set_replaces_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u42", "a1")?;

    store
        .set(&path, doc(json!({"text": "hi", "likes": 3})))
        .await
        .map_err(|e| format!("first set: {e}"))?;
    store
        .set(&path, doc(json!({"text": "edited"})))
        .await
        .map_err(|e| format!("second set: {e}"))?;

    let stored = read(&store, &path).await?;
    if stored.contains_key("likes") {
        return Err(format!("stale field survived a replace: {stored:?}"));
    }
    if stored.get("text") != Some(&json!("edited")) {
        return Err(format!("expected text=edited, got {stored:?}"));
    }
    Ok(())
}

async fn nested_values_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u42", "a2")?;
    let value = doc(json!({
        "kind": "photo",
        "tags": ["beach", "sunset"],
        "geo": {"lat": 12.5, "lng": -4.25},
        "count": 7,
        "public": true,
        "caption": null,
    }));

    store
        .set(&path, value.clone())
        .await
        .map_err(|e| format!("set: {e}"))?;

    let stored = read(&store, &path).await?;
    if stored != value {
        return Err(format!("round trip changed the document: {stored:?}"));
    }
    Ok(())
}
