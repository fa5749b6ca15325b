//! Typed JSON collections over a [`StorageBackend`].
//!
//! Every collection is one document, read and written whole. Callers that
//! read-modify-write go through [`DurableCollection::lock`], which holds the
//! per-name lock until the guard is dropped, so two logical callers in the
//! same process can never interleave their updates of one collection.
//!
//! When a caller needs two collections at once (moving an outreach item
//! from the active queue to the sent log), it must lock them in a fixed
//! order; the outreach queue always locks its active collection first.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex as StdMutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{validate_name, MemoryBackend, StorageBackend};
use crate::error::StorageError;

type LockTable = HashMap<String, Arc<Mutex<()>>>;

/// Hands out collection handles that share one lock per name.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<StdMutex<LockTable>>,
}

impl DurableStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        DurableStore {
            backend,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// A store backed by [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Open a handle on the named collection. Nothing is read until the
    /// first access; an absent document reads as `T::default()`.
    pub fn collection<T>(&self, name: &str) -> Result<DurableCollection<T>, StorageError> {
        validate_name(name)?;
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StorageError::Backend("lock table poisoned".to_string()))?;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        Ok(DurableCollection {
            name: name.to_string(),
            backend: self.backend.clone(),
            lock,
            _document: PhantomData,
        })
    }
}

/// Handle on one named document of type `T`.
pub struct DurableCollection<T> {
    name: String,
    backend: Arc<dyn StorageBackend>,
    lock: Arc<Mutex<()>>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for DurableCollection<T> {
    fn clone(&self) -> Self {
        DurableCollection {
            name: self.name.clone(),
            backend: self.backend.clone(),
            lock: self.lock.clone(),
            _document: PhantomData,
        }
    }
}

impl<T> DurableCollection<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where this collection lives (file path or memory key).
    pub fn location(&self) -> String {
        self.backend.locate(&self.name)
    }

    /// Read the committed document.
    pub async fn read(&self) -> Result<T, StorageError> {
        let _held = self.lock.lock().await;
        self.load().await
    }

    /// Replace the committed document.
    pub async fn write(&self, document: &T) -> Result<(), StorageError> {
        let _held = self.lock.lock().await;
        self.save(document).await
    }

    /// Lock the collection and load its document for a read-modify-write.
    pub async fn lock(&self) -> Result<CollectionGuard<'_, T>, StorageError> {
        let held = self.lock.lock().await;
        let document = self.load().await?;
        Ok(CollectionGuard {
            collection: self,
            _held: held,
            document,
        })
    }

    async fn load(&self) -> Result<T, StorageError> {
        match self.backend.load(&self.name).await? {
            None => Ok(T::default()),
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StorageError::Malformed {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    async fn save(&self, document: &T) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec_pretty(document).map_err(|source| StorageError::Encode {
                name: self.name.clone(),
                source,
            })?;
        tracing::debug!(collection = %self.name, bytes = bytes.len(), "committing collection");
        self.backend.store(&self.name, bytes).await
    }
}

/// A locked, loaded collection document.
///
/// Mutations happen in memory through `Deref`/`DerefMut`; nothing reaches
/// storage until [`commit`](CollectionGuard::commit). Dropping the guard
/// without committing discards the changes.
pub struct CollectionGuard<'a, T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    collection: &'a DurableCollection<T>,
    _held: MutexGuard<'a, ()>,
    document: T,
}

impl<T> CollectionGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    /// Write the current document. The lock stays held, so a caller can
    /// commit several collections before releasing any of them.
    pub async fn commit(&self) -> Result<(), StorageError> {
        self.collection.save(&self.document).await
    }

    pub fn into_inner(self) -> T {
        self.document
    }
}

impl<T> Deref for CollectionGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.document
    }
}

impl<T> DerefMut for CollectionGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.document
    }
}
