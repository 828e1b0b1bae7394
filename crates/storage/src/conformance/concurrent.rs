use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::{doc, entry, read, TestResult};
use crate::{DocumentStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "same_path_leaves_one_complete_value",
            same_path_leaves_one_complete_value(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "different_paths_all_succeed",
            different_paths_all_succeed(factory).await,
        ),
    ]
}

/// N tasks race to write distinct documents to the same path. Every write
/// succeeds and the survivor is exactly one of the written values, with no
/// fields mixed in from the others.
async fn same_path_leaves_one_complete_value<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let path = entry("u1", "contended")?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        let p = path.clone();
        let mut value = doc(json!({ "writer": i }));
        value.insert(format!("only_{i}"), json!(true));
        handles.push(tokio::spawn(async move { s.set(&p, value).await }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e: StorageError| format!("set: {e}"))?;
    }

    let stored = read(store.as_ref(), &path).await?;
    let writer = stored
        .get("writer")
        .and_then(|w| w.as_u64())
        .ok_or_else(|| format!("survivor has no writer field: {stored:?}"))?;
    if stored.len() != 2 || !stored.contains_key(&format!("only_{writer}")) {
        return Err(format!("survivor mixes fields from several writers: {stored:?}"));
    }
    Ok(())
}

async fn different_paths_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        let p = entry(&format!("user-{i}"), &format!("activity-{i}"))?;
        handles.push(tokio::spawn(async move {
            s.set(&p, doc(json!({ "n": i }))).await?;
            Ok::<_, StorageError>(p)
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        let p = handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e| format!("set: {e}"))?;
        paths.push(p);
    }

    for (i, p) in paths.iter().enumerate() {
        let stored = read(store.as_ref(), p).await?;
        if stored.get("n") != Some(&json!(i)) {
            return Err(format!("{p}: expected n={i}, got {stored:?}"));
        }
    }
    Ok(())
}
