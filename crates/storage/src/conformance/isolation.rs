use std::future::Future;

use serde_json::json;

use super::{doc, entry, read, TestResult};
use crate::DocumentStore;

pub(super) async fn run_isolation_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "isolation",
            "same_activity_different_users",
            same_activity_different_users(factory).await,
        ),
        TestResult::from_result(
            "isolation",
            "sibling_activities_untouched",
            sibling_activities_untouched(factory).await,
        ),
    ]
}

async fn same_activity_different_users<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let alice = entry("alice", "a1")?;
    let bob = entry("bob", "a1")?;

    store
        .set(&alice, doc(json!({"owner": "alice"})))
        .await
        .map_err(|e| format!("set alice: {e}"))?;
    store
        .set(&bob, doc(json!({"owner": "bob"})))
        .await
        .map_err(|e| format!("set bob: {e}"))?;

    let a = read(&store, &alice).await?;
    let b = read(&store, &bob).await?;
    if a.get("owner") != Some(&json!("alice")) || b.get("owner") != Some(&json!("bob")) {
        return Err(format!("documents bled across users: {a:?} / {b:?}"));
    }
    Ok(())
}

async fn sibling_activities_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let first = entry("u1", "a1")?;
    let second = entry("u1", "a2")?;

    store
        .set(&first, doc(json!({"n": 1})))
        .await
        .map_err(|e| format!("set a1: {e}"))?;
    store
        .set(&second, doc(json!({"n": 2})))
        .await
        .map_err(|e| format!("set a2: {e}"))?;
    store
        .set(&second, doc(json!({"n": 3})))
        .await
        .map_err(|e| format!("replace a2: {e}"))?;

    let stored = read(&store, &first).await?;
    if stored.get("n") != Some(&json!(1)) {
        return Err(format!("sibling document changed: {stored:?}"));
    }
    Ok(())
}
