use relaybot_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("catalog lookup failed: {0}")]
    Fetch(String),
}
