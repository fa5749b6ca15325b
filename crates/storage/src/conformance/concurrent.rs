use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use super::{sample_document, Check};
use crate::{DurableStore, StorageBackend, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<B, F, Fut>(factory: &F) -> Vec<Check>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    vec![
        Check::new("racing_stores_never_tear", racing_stores_never_tear(factory).await),
        Check::new("locked_increments_are_not_lost", locked_increments_are_not_lost(factory).await),
    ]
}

// ── Racing stores: last writer wins, nobody tears ───────────────────────────

/// N tasks store different complete documents under one name at the same
/// time. Whatever is left must be exactly one of them.
async fn racing_stores_never_tear<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let backend = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let b = backend.clone();
        handles.push(tokio::spawn(async move {
            b.store("outreach_queue", sample_document(&format!("writer-{i}")))
                .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let loaded = backend
        .load("outreach_queue")
        .await
        .map_err(|e| format!("load: {e}"))?
        .ok_or("document missing after racing stores")?;

    let matches_one = (0..N).any(|i| loaded == sample_document(&format!("writer-{i}")));
    if !matches_one {
        return Err(format!(
            "document is not any single writer's version: {}",
            String::from_utf8_lossy(&loaded)
        ));
    }
    Ok(())
}

// ── Locked read-modify-write ─────────────────────────────────────────────────

/// N tasks each lock the collection, bump a counter, and commit. Without
/// the per-name lock some increments would be lost.
async fn locked_increments_are_not_lost<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let store = DurableStore::new(Arc::new(factory().await));

    let mut handles = Vec::new();
    for _ in 0..N {
        let counters = store
            .collection::<BTreeMap<String, u64>>("counters")
            .map_err(|e| e.to_string())?;
        handles.push(tokio::spawn(async move {
            let mut guard = counters.lock().await?;
            *guard.entry("enqueued".to_string()).or_insert(0) += 1;
            tokio::task::yield_now().await;
            guard.commit().await?;
            Ok::<(), StorageError>(())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let counters = store
        .collection::<BTreeMap<String, u64>>("counters")
        .map_err(|e| e.to_string())?;
    let total = counters
        .read()
        .await
        .map_err(|e| format!("read: {e}"))?
        .get("enqueued")
        .copied()
        .unwrap_or(0);
    if total != N as u64 {
        return Err(format!("expected {N} increments, got {total}"));
    }
    Ok(())
}
