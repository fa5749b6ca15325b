//! Byte-level persistence backends for named documents.
//!
//! Two levels of abstraction:
//! - [`StorageBackend`]: loads and stores ONE named document as raw bytes
//! - [`DurableStore`](crate::DurableStore): typed JSON collections with
//!   per-name locking, built on top of any backend
//!
//! Backends never merge or patch: every `store` is a complete replacement
//! of the named document, and a reader must never observe a partial one.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;

use crate::error::StorageError;

/// Persists named documents.
///
/// ## Replacement semantics
///
/// `store(name, bytes)` replaces the whole document. A crash part-way
/// through a `store` must leave the previously committed bytes readable.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single backend can
/// be shared between the delivery worker and request handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Load a document. Returns `Ok(None)` if it has never been stored.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Atomically replace a document.
    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Human-readable location of a document, for logs and diagnostics.
    fn locate(&self, name: &str) -> String;
}

/// Reject names that would escape the storage root or collide with temp files.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
