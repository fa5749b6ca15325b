use async_trait::async_trait;

use crate::error::CatalogError;

/// Source of truth for item titles, consulted on a cache miss.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// `Ok(None)` means the catalog has no title for this item.
    async fn fetch_title(&self, item_id: &str) -> Result<Option<String>, CatalogError>;
}
