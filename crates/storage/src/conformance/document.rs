use std::future::Future;

use super::{sample_document, Check};
use crate::{StorageBackend, StorageError};

pub(super) async fn run_document_tests<B, F, Fut>(factory: &F) -> Vec<Check>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    vec![
        Check::new("missing_document_loads_none", missing_document_loads_none(factory).await),
        Check::new("store_then_load_round_trips", store_then_load_round_trips(factory).await),
        Check::new("store_replaces_whole_document", store_replaces_whole_document(factory).await),
        Check::new("names_are_isolated", names_are_isolated(factory).await),
        Check::new("invalid_name_rejected", invalid_name_rejected(factory).await),
    ]
}

async fn missing_document_loads_none<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let b = factory().await;
    match b.load("outreach_queue").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

async fn store_then_load_round_trips<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let b = factory().await;
    let doc = sample_document("v1");
    b.store("outreach_queue", doc.clone())
        .await
        .map_err(|e| format!("store: {e}"))?;

    let loaded = b
        .load("outreach_queue")
        .await
        .map_err(|e| format!("load: {e}"))?
        .ok_or("document missing after store")?;
    if loaded != doc {
        return Err("loaded bytes differ from stored bytes".to_string());
    }
    Ok(())
}

/// A second store leaves no trace of the first document.
async fn store_replaces_whole_document<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let b = factory().await;
    b.store("outreach_sent", sample_document("a long first version"))
        .await
        .map_err(|e| format!("store v1: {e}"))?;
    b.store("outreach_sent", b"{}".to_vec())
        .await
        .map_err(|e| format!("store v2: {e}"))?;

    let loaded = b
        .load("outreach_sent")
        .await
        .map_err(|e| format!("load: {e}"))?
        .ok_or("document missing after store")?;
    if loaded != b"{}" {
        return Err(format!(
            "expected exactly the second document, got {:?}",
            String::from_utf8_lossy(&loaded)
        ));
    }
    Ok(())
}

async fn names_are_isolated<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let b = factory().await;
    b.store("outreach_queue", sample_document("queue"))
        .await
        .map_err(|e| format!("store queue: {e}"))?;
    b.store("outreach_dead", sample_document("dead"))
        .await
        .map_err(|e| format!("store dead: {e}"))?;

    let queue = b.load("outreach_queue").await.map_err(|e| e.to_string())?;
    let dead = b.load("outreach_dead").await.map_err(|e| e.to_string())?;
    let untouched = b.load("outreach_sent").await.map_err(|e| e.to_string())?;

    if queue != Some(sample_document("queue")) {
        return Err("outreach_queue overwritten by another name".to_string());
    }
    if dead != Some(sample_document("dead")) {
        return Err("outreach_dead has wrong contents".to_string());
    }
    if untouched.is_some() {
        return Err("outreach_sent exists without ever being stored".to_string());
    }
    Ok(())
}

async fn invalid_name_rejected<B, F, Fut>(factory: &F) -> Result<(), String>
where
    B: StorageBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let b = factory().await;
    match b.store("../outside", b"{}".to_vec()).await {
        Err(StorageError::InvalidName(_)) => Ok(()),
        other => Err(format!("expected InvalidName, got {:?}", other)),
    }
}
