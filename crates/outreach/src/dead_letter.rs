//! Read side of the dead-letter store.
//!
//! Records are only ever written by [`OutreachQueue`](crate::OutreachQueue)
//! when it moves an item out of the active set. Nothing requeues them;
//! getting a dead item delivered again is a manual operator action.

use std::collections::BTreeMap;

use relaybot_storage::{DurableCollection, StorageContext};

use crate::error::OutreachError;
use crate::model::{DeadLetterRecord, ItemId};

pub const DEAD_LETTER_COLLECTION: &str = "outreach_dead";

pub(crate) type DeadLetterLog = BTreeMap<ItemId, DeadLetterRecord>;

#[derive(Clone)]
pub struct DeadLetterStore {
    collection: DurableCollection<DeadLetterLog>,
}

impl DeadLetterStore {
    pub(crate) fn open(ctx: &StorageContext) -> Result<Self, OutreachError> {
        Ok(DeadLetterStore {
            collection: ctx.store().collection(DEAD_LETTER_COLLECTION)?,
        })
    }

    pub(crate) fn collection(&self) -> &DurableCollection<DeadLetterLog> {
        &self.collection
    }

    /// All dead letters, oldest id first.
    pub async fn list(&self) -> Result<Vec<DeadLetterRecord>, OutreachError> {
        Ok(self.collection.read().await?.into_values().collect())
    }

    pub async fn get(&self, id: ItemId) -> Result<Option<DeadLetterRecord>, OutreachError> {
        Ok(self.collection.read().await?.remove(&id))
    }

    pub async fn len(&self) -> Result<usize, OutreachError> {
        Ok(self.collection.read().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, OutreachError> {
        Ok(self.len().await? == 0)
    }

    pub fn location(&self) -> String {
        self.collection.location()
    }
}
