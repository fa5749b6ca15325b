//! In-memory backend for tests and dry runs. Nothing survives the process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_name, StorageBackend};
use crate::error::StorageError;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_name(name)?;
        let documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Backend("memory backend poisoned".to_string()))?;
        Ok(documents.get(name).cloned())
    }

    async fn store(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_name(name)?;
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| StorageError::Backend("memory backend poisoned".to_string()))?;
        documents.insert(name.to_string(), bytes);
        Ok(())
    }

    fn locate(&self, name: &str) -> String {
        format!("memory:{name}")
    }
}
