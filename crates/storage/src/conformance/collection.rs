use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use super::Check;
use crate::{DurableStore, StorageBackend, StorageError};

type Titles = BTreeMap<String, String>;

pub(super) async fn run_collection_tests<B, F, Fut>(factory: &F) -> Vec<Check>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    vec![
        Check::new("absent_collection_reads_default", absent_collection_reads_default(factory).await),
        Check::new("typed_write_then_read", typed_write_then_read(factory).await),
        Check::new("guard_commit_is_visible", guard_commit_is_visible(factory).await),
        Check::new("malformed_document_is_an_error", malformed_document_is_an_error(factory).await),
    ]
}

async fn absent_collection_reads_default<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let store = DurableStore::new(Arc::new(factory().await));
    let titles = store
        .collection::<Titles>("sku_title_cache")
        .map_err(|e| e.to_string())?;
    let doc = titles.read().await.map_err(|e| format!("read: {e}"))?;
    if !doc.is_empty() {
        return Err(format!("expected empty default, got {} entries", doc.len()));
    }
    Ok(())
}

async fn typed_write_then_read<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let store = DurableStore::new(Arc::new(factory().await));
    let titles = store
        .collection::<Titles>("sku_title_cache")
        .map_err(|e| e.to_string())?;

    let mut doc = Titles::new();
    doc.insert("148812".to_string(), "Термокружка 450 мл".to_string());
    doc.insert("7".to_string(), "Kettle".to_string());
    titles.write(&doc).await.map_err(|e| format!("write: {e}"))?;

    let read = titles.read().await.map_err(|e| format!("read: {e}"))?;
    if read != doc {
        return Err(format!("expected {:?}, got {:?}", doc, read));
    }
    Ok(())
}

async fn guard_commit_is_visible<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let store = DurableStore::new(Arc::new(factory().await));
    let titles = store
        .collection::<Titles>("sku_title_cache")
        .map_err(|e| e.to_string())?;

    {
        let mut guard = titles.lock().await.map_err(|e| format!("lock: {e}"))?;
        guard.insert("1".to_string(), "first".to_string());
        guard.commit().await.map_err(|e| format!("commit: {e}"))?;
    }

    // A second handle on the same name sees the committed document.
    let other = store
        .collection::<Titles>("sku_title_cache")
        .map_err(|e| e.to_string())?;
    let read = other.read().await.map_err(|e| format!("read: {e}"))?;
    if read.get("1").map(String::as_str) != Some("first") {
        return Err(format!("committed entry not visible: {:?}", read));
    }
    Ok(())
}

async fn malformed_document_is_an_error<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let backend = factory().await;
    backend
        .store("outreach_dead", b"[1, 2,".to_vec())
        .await
        .map_err(|e| format!("raw store: {e}"))?;

    let store = DurableStore::new(Arc::new(backend));
    let dead = store
        .collection::<Titles>("outreach_dead")
        .map_err(|e| e.to_string())?;
    match dead.read().await {
        Err(StorageError::Malformed { name, .. }) if name == "outreach_dead" => Ok(()),
        other => Err(format!("expected Malformed, got {:?}", other)),
    }
}
