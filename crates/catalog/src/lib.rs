//! Display titles for marketplace catalog items, cached with a TTL.

mod cache;
mod error;
mod fetcher;

pub use cache::{TitleCache, TitleCacheEntry, DEFAULT_TITLE_TTL, TITLE_CACHE_COLLECTION};
pub use error::CatalogError;
pub use fetcher::CatalogFetcher;
