use std::future::Future;

use serde_json::json;

use super::{doc, entry, read, TestResult};
use crate::DocumentStore;

pub(super) async fn run_idempotent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "idempotent",
            "redelivery_yields_same_state",
            redelivery_yields_same_state(factory).await,
        ),
        TestResult::from_result(
            "idempotent",
            "out_of_order_redelivery_last_write_wins",
            out_of_order_redelivery_last_write_wins(factory).await,
        ),
    ]
}

async fn redelivery_yields_same_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u7", "post-1")?;
    let value = doc(json!({"text": "hello", "at": "2024-05-01T10:00:00Z"}));

    store
        .set(&path, value.clone())
        .await
        .map_err(|e| format!("first delivery: {e}"))?;
    let after_first = read(&store, &path).await?;

    store
        .set(&path, value)
        .await
        .map_err(|e| format!("second delivery: {e}"))?;
    let after_second = read(&store, &path).await?;

    if after_first != after_second {
        return Err(format!(
            "state changed on redelivery: {after_first:?} -> {after_second:?}"
        ));
    }
    Ok(())
}

/// Delivery order is not guaranteed; whichever write lands last is the value.
async fn out_of_order_redelivery_last_write_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let path = entry("u7", "post-2")?;
    let older = doc(json!({"rev": 1}));
    let newer = doc(json!({"rev": 2}));

    for value in [newer.clone(), older.clone(), newer, older.clone()] {
        store
            .set(&path, value)
            .await
            .map_err(|e| format!("set: {e}"))?;
    }

    let stored = read(&store, &path).await?;
    if stored != older {
        return Err(format!("expected last write {older:?}, got {stored:?}"));
    }
    Ok(())
}
