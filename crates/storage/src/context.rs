use std::sync::Arc;

use crate::backend::FileBackend;
use crate::error::StorageError;
use crate::root::{StorageRoot, StorageRootResolver};
use crate::store::DurableStore;

/// The resolved storage root and the store opened on it.
///
/// Built once at startup and passed to every component that persists
/// state. There is no global lookup of either.
#[derive(Clone)]
pub struct StorageContext {
    root: Option<StorageRoot>,
    store: DurableStore,
}

impl StorageContext {
    /// Resolve and probe the root, then open a file-backed store on it.
    pub fn open(resolver: &StorageRootResolver) -> Result<Self, StorageError> {
        let root = resolver.resolve()?;
        Ok(Self::from_root(root))
    }

    pub fn from_root(root: StorageRoot) -> Self {
        let store = DurableStore::new(Arc::new(FileBackend::new(root.path())));
        StorageContext {
            root: Some(root),
            store,
        }
    }

    /// A context with no root, backed by memory.
    pub fn in_memory() -> Self {
        StorageContext {
            root: None,
            store: DurableStore::in_memory(),
        }
    }

    pub fn root(&self) -> Option<&StorageRoot> {
        self.root.as_ref()
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::RootCandidate;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn collections_land_under_resolved_root() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = StorageRootResolver::new(
            vec![RootCandidate::new(
                "STORAGE_DIR",
                Some(tmp.path().to_string_lossy().to_string()),
            )],
            "data",
        );
        let ctx = StorageContext::open(&resolver).unwrap();

        let sent = ctx
            .store()
            .collection::<BTreeMap<String, String>>("outreach_sent")
            .unwrap();
        sent.write(&BTreeMap::new()).await.unwrap();

        assert!(tmp.path().join("outreach_sent.json").is_file());
        assert_eq!(ctx.root().unwrap().path(), tmp.path());
    }
}
