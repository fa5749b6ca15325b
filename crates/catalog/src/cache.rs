use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use relaybot_storage::{Clock, DurableCollection, StorageContext};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CatalogError;
use crate::fetcher::CatalogFetcher;

pub const TITLE_CACHE_COLLECTION: &str = "sku_title_cache";
pub const DEFAULT_TITLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleCacheEntry {
    pub item_id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

type TitleLog = BTreeMap<String, TitleCacheEntry>;

/// Item id to title, persisted in `sku_title_cache.json`.
///
/// Expiry is lazy: an entry older than the TTL reads as a miss but stays on
/// disk until the next `put` for the same id replaces it.
#[derive(Clone)]
pub struct TitleCache {
    entries: DurableCollection<TitleLog>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TitleCache {
    pub fn open(
        ctx: &StorageContext,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Result<Self, CatalogError> {
        Ok(TitleCache {
            entries: ctx.store().collection(TITLE_CACHE_COLLECTION)?,
            clock,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached title, if present and younger than the TTL.
    pub async fn get(&self, item_id: &str) -> Result<Option<String>, CatalogError> {
        let item_id = item_id.trim();
        let now = self.clock.now();
        Ok(self
            .entries
            .read()
            .await?
            .remove(item_id)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.title))
    }

    /// The stored entry regardless of age.
    pub async fn entry(&self, item_id: &str) -> Result<Option<TitleCacheEntry>, CatalogError> {
        Ok(self.entries.read().await?.remove(item_id.trim()))
    }

    /// Store a title. Blank ids or titles are ignored; returns whether
    /// anything was written.
    pub async fn put(&self, item_id: &str, title: &str) -> Result<bool, CatalogError> {
        let (item_id, title) = (item_id.trim(), title.trim());
        if item_id.is_empty() || title.is_empty() {
            return Ok(false);
        }

        let mut entries = self.entries.lock().await?;
        entries.insert(
            item_id.to_string(),
            TitleCacheEntry {
                item_id: item_id.to_string(),
                title: title.to_string(),
                fetched_at: self.clock.now(),
            },
        );
        entries.commit().await?;
        tracing::debug!(item_id, "title cached");
        Ok(true)
    }

    /// Cached title, or fetch and cache it on a miss. A catalog that has no
    /// title is not remembered, so the next call asks again.
    pub async fn get_or_fetch(
        &self,
        item_id: &str,
        fetcher: &dyn CatalogFetcher,
    ) -> Result<Option<String>, CatalogError> {
        if let Some(title) = self.get(item_id).await? {
            return Ok(Some(title));
        }

        let fetched = fetcher.fetch_title(item_id.trim()).await?;
        match fetched.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => {
                self.put(item_id, title).await?;
                Ok(Some(title.to_string()))
            }
            _ => {
                tracing::debug!(item_id, "catalog has no title");
                Ok(None)
            }
        }
    }

    fn is_fresh(&self, entry: &TitleCacheEntry, now: OffsetDateTime) -> bool {
        match Duration::try_from(now - entry.fetched_at) {
            Ok(age) => age < self.ttl,
            // fetched_at is in the future; treat as fresh
            Err(_) => true,
        }
    }
}
