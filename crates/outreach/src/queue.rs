//! The durable outreach queue.
//!
//! Three collections back the queue: the active set, the sent log, and the
//! dead-letter store. Moving an item out of the active set writes the
//! destination first and the active set second, always locking the active
//! set first. A crash between the two writes leaves the item in both
//! collections; [`OutreachQueue::open`] removes such leftovers from the
//! active set before anything else runs, so the item can never be
//! delivered twice from a stale active entry after the restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use relaybot_storage::{Clock, CollectionGuard, DurableCollection, StorageContext};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Notify;

use crate::dead_letter::{DeadLetterLog, DeadLetterStore};
use crate::error::OutreachError;
use crate::model::{
    idempotency_key, DeadLetterRecord, ItemId, ItemState, Location, OutreachItem, Payload,
    Recipient, SentRecord,
};
use crate::schedule::WakeupSchedule;

pub const QUEUE_COLLECTION: &str = "outreach_queue";
pub const SENT_COLLECTION: &str = "outreach_sent";

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ActiveQueue {
    /// Highest id ever handed out. Never decreases.
    #[serde(default)]
    last_id: u64,
    #[serde(default)]
    items: BTreeMap<ItemId, OutreachItem>,
}

impl ActiveQueue {
    fn allocate_id(&mut self) -> ItemId {
        self.last_id += 1;
        ItemId(self.last_id)
    }
}

pub(crate) type SentLog = BTreeMap<ItemId, SentRecord>;

/// Result of [`OutreachQueue::enqueue_unique`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(ItemId),
    /// The same message to the same recipient is already waiting.
    AlreadyPending(ItemId),
    /// The same message to the same recipient was already delivered.
    AlreadySent(ItemId),
}

impl EnqueueOutcome {
    pub fn id(&self) -> ItemId {
        match *self {
            EnqueueOutcome::Enqueued(id)
            | EnqueueOutcome::AlreadyPending(id)
            | EnqueueOutcome::AlreadySent(id) => id,
        }
    }
}

/// Counts across the three collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub scheduled: usize,
    pub sent: usize,
    pub dead_letters: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_attempt_at: Option<OffsetDateTime>,
}

/// How a delivery attempt ended, as applied to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Delivered,
    Retry {
        error: String,
        next_attempt_at: OffsetDateTime,
    },
    DeadLetter {
        error: String,
    },
}

#[derive(Clone)]
pub struct OutreachQueue {
    active: DurableCollection<ActiveQueue>,
    sent: DurableCollection<SentLog>,
    dead: DeadLetterStore,
    clock: Arc<dyn Clock>,
    wakeup: Arc<Notify>,
    writable: bool,
}

impl OutreachQueue {
    /// Open the queue and reconcile interrupted moves.
    ///
    /// Only one process may hold a writable queue on a storage root at a
    /// time. Fails if any of the three collection files exists but does not
    /// parse; the files are left untouched for the operator.
    pub async fn open(ctx: &StorageContext, clock: Arc<dyn Clock>) -> Result<Self, OutreachError> {
        let queue = Self::handle(ctx, clock, true)?;
        queue.reconcile().await?;
        Ok(queue)
    }

    /// Open for inspection only. Never writes, so it is safe next to a
    /// running worker in another process. Interrupted moves are reported
    /// but left for the next writable `open`; until then such an item is
    /// still visible in the active set.
    pub async fn open_read_only(
        ctx: &StorageContext,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OutreachError> {
        let queue = Self::handle(ctx, clock, false)?;
        let active = queue.active.read().await?;
        let sent = queue.sent.read().await?;
        let dead = queue.dead.collection().read().await?;
        let stale = finished_ids(&active, &sent, &dead);
        if !stale.is_empty() {
            tracing::warn!(
                count = stale.len(),
                "active set holds items already moved out; the next writer will drop them"
            );
        }
        Ok(queue)
    }

    fn handle(
        ctx: &StorageContext,
        clock: Arc<dyn Clock>,
        writable: bool,
    ) -> Result<Self, OutreachError> {
        Ok(OutreachQueue {
            active: ctx.store().collection(QUEUE_COLLECTION)?,
            sent: ctx.store().collection(SENT_COLLECTION)?,
            dead: DeadLetterStore::open(ctx)?,
            clock,
            wakeup: Arc::new(Notify::new()),
            writable,
        })
    }

    fn ensure_writable(&self) -> Result<(), OutreachError> {
        if self.writable {
            Ok(())
        } else {
            Err(OutreachError::ReadOnly)
        }
    }

    async fn reconcile(&self) -> Result<(), OutreachError> {
        let mut active = self.active.lock().await?;
        let sent = self.sent.read().await?;
        let dead = self.dead.collection().read().await?;

        let finished = finished_ids(&active, &sent, &dead);
        for id in &finished {
            tracing::warn!(item_id = %id, "dropping active entry already moved out of the queue");
            active.items.remove(id);
        }

        let highest = active
            .items
            .keys()
            .chain(sent.keys())
            .chain(dead.keys())
            .map(|id| id.0)
            .max()
            .unwrap_or(0);
        let id_raised = highest > active.last_id;
        if id_raised {
            active.last_id = highest;
        }

        if !finished.is_empty() || id_raised {
            active.commit().await?;
        }

        tracing::info!(
            active = active.items.len(),
            sent = sent.len(),
            dead_letters = dead.len(),
            location = %self.active.location(),
            "outreach queue opened"
        );
        Ok(())
    }

    /// Add a message. Persisted before returning; never waits on delivery.
    pub async fn enqueue(
        &self,
        recipient: Recipient,
        payload: Payload,
    ) -> Result<ItemId, OutreachError> {
        self.ensure_writable()?;
        validate(&recipient, &payload)?;
        let key = idempotency_key(&recipient, &payload);
        let active = self.active.lock().await?;
        self.push(active, recipient, payload, key).await
    }

    /// Add a message unless the same message to the same recipient is
    /// already pending or was already sent.
    pub async fn enqueue_unique(
        &self,
        recipient: Recipient,
        payload: Payload,
    ) -> Result<EnqueueOutcome, OutreachError> {
        self.ensure_writable()?;
        validate(&recipient, &payload)?;
        let key = idempotency_key(&recipient, &payload);

        let active = self.active.lock().await?;
        if let Some(existing) = active
            .items
            .values()
            .find(|item| item.idempotency_key.as_deref() == Some(key.as_str()))
        {
            tracing::debug!(item_id = %existing.id, "duplicate outreach already pending");
            return Ok(EnqueueOutcome::AlreadyPending(existing.id));
        }

        let sent = self.sent.read().await?;
        if let Some(record) = sent
            .values()
            .find(|record| record.idempotency_key.as_deref() == Some(key.as_str()))
        {
            tracing::debug!(item_id = %record.id, "duplicate outreach already sent");
            return Ok(EnqueueOutcome::AlreadySent(record.id));
        }

        let id = self.push(active, recipient, payload, key).await?;
        Ok(EnqueueOutcome::Enqueued(id))
    }

    async fn push(
        &self,
        mut active: CollectionGuard<'_, ActiveQueue>,
        recipient: Recipient,
        payload: Payload,
        idempotency_key: String,
    ) -> Result<ItemId, OutreachError> {
        let id = active.allocate_id();
        let item = OutreachItem {
            id,
            recipient,
            payload,
            state: ItemState::Pending,
            attempt_count: 0,
            last_error: None,
            created_at: self.clock.now(),
            idempotency_key: Some(idempotency_key),
        };
        tracing::info!(item_id = %id, recipient = %item.recipient, "outreach enqueued");
        active.items.insert(id, item);
        active.commit().await?;
        drop(active);

        self.wakeup.notify_one();
        Ok(id)
    }

    /// Active items, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<OutreachItem>, OutreachError> {
        let mut items: Vec<OutreachItem> =
            self.active.read().await?.items.into_values().collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        Ok(items)
    }

    pub async fn get(&self, id: ItemId) -> Result<Option<OutreachItem>, OutreachError> {
        Ok(self.active.read().await?.items.remove(&id))
    }

    /// Delivered items, oldest id first.
    pub async fn sent_log(&self) -> Result<Vec<SentRecord>, OutreachError> {
        Ok(self.sent.read().await?.into_values().collect())
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dead
    }

    /// Which collection holds `id`, if any.
    pub async fn locate(&self, id: ItemId) -> Result<Option<Location>, OutreachError> {
        if self.active.read().await?.items.contains_key(&id) {
            return Ok(Some(Location::Active));
        }
        if self.sent.read().await?.contains_key(&id) {
            return Ok(Some(Location::Sent));
        }
        if self.dead.collection().read().await?.contains_key(&id) {
            return Ok(Some(Location::DeadLetter));
        }
        Ok(None)
    }

    pub async fn stats(&self) -> Result<QueueStats, OutreachError> {
        let active = self.active.read().await?;
        let (mut pending, mut scheduled) = (0, 0);
        let mut next_attempt_at: Option<OffsetDateTime> = None;
        for item in active.items.values() {
            match item.state {
                ItemState::Pending => pending += 1,
                ItemState::Scheduled { next_attempt_at: at } => {
                    scheduled += 1;
                    next_attempt_at = Some(next_attempt_at.map_or(at, |cur| cur.min(at)));
                }
            }
        }
        Ok(QueueStats {
            pending,
            scheduled,
            sent: self.sent.read().await?.len(),
            dead_letters: self.dead.len().await?,
            next_attempt_at,
        })
    }

    pub(crate) async fn plan(&self) -> Result<WakeupSchedule, OutreachError> {
        let active = self.active.read().await?;
        Ok(WakeupSchedule::build(
            active.items.into_values(),
            self.clock.now(),
        ))
    }

    pub(crate) fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Record the outcome of an attempt. `attempt_count` is the item's
    /// count including this attempt.
    ///
    /// Returns `false` if the item is no longer active (nothing applied).
    pub(crate) async fn apply(
        &self,
        id: ItemId,
        attempt_count: u32,
        transition: Transition,
    ) -> Result<bool, OutreachError> {
        self.ensure_writable()?;
        let mut active = self.active.lock().await?;
        let Some(item) = active.items.get(&id).cloned() else {
            tracing::warn!(item_id = %id, "attempted item is no longer active");
            return Ok(false);
        };
        let now = self.clock.now();

        match transition {
            Transition::Delivered => {
                let mut sent = self.sent.lock().await?;
                sent.insert(
                    id,
                    SentRecord {
                        id,
                        recipient: item.recipient,
                        delivered_at: now,
                        attempt_count,
                        idempotency_key: item.idempotency_key,
                    },
                );
                sent.commit().await?;
                active.items.remove(&id);
                active.commit().await?;
            }
            Transition::Retry {
                error,
                next_attempt_at,
            } => {
                if let Some(entry) = active.items.get_mut(&id) {
                    entry.attempt_count = attempt_count;
                    entry.last_error = Some(error);
                    entry.state = ItemState::Scheduled { next_attempt_at };
                }
                active.commit().await?;
            }
            Transition::DeadLetter { error } => {
                let mut dead: CollectionGuard<'_, DeadLetterLog> =
                    self.dead.collection().lock().await?;
                dead.insert(
                    id,
                    DeadLetterRecord {
                        id,
                        recipient: item.recipient,
                        payload: item.payload,
                        attempt_count,
                        last_error: error,
                        created_at: item.created_at,
                        dead_at: now,
                        idempotency_key: item.idempotency_key,
                    },
                );
                dead.commit().await?;
                active.items.remove(&id);
                active.commit().await?;
            }
        }
        Ok(true)
    }
}

/// Active entries that already reached the sent log or dead letters.
fn finished_ids(active: &ActiveQueue, sent: &SentLog, dead: &DeadLetterLog) -> Vec<ItemId> {
    active
        .items
        .keys()
        .filter(|id| sent.contains_key(id) || dead.contains_key(id))
        .copied()
        .collect()
}

fn validate(recipient: &Recipient, payload: &Payload) -> Result<(), OutreachError> {
    if recipient.as_str().is_empty() {
        return Err(OutreachError::EmptyRecipient);
    }
    if payload.is_empty() {
        return Err(OutreachError::EmptyPayload);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use relaybot_storage::{ManualClock, StorageError};
    use time::macros::datetime;

    use super::*;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(datetime!(2025-05-01 08:00 UTC)))
    }

    async fn open_memory(clock: Arc<ManualClock>) -> (StorageContext, OutreachQueue) {
        let ctx = StorageContext::in_memory();
        let queue = OutreachQueue::open(&ctx, clock).await.unwrap();
        (ctx, queue)
    }

    #[tokio::test]
    async fn enqueue_assigns_unique_increasing_ids() {
        let (_ctx, queue) = open_memory(clock()).await;
        let mut seen = HashSet::new();
        let mut last = ItemId(0);
        for i in 0..25 {
            let id = queue
                .enqueue(Recipient::new(format!("chat-{i}")), Payload::text("hi"))
                .await
                .unwrap();
            assert!(seen.insert(id), "duplicate id {id}");
            assert!(id > last);
            last = id;
        }
    }

    #[tokio::test]
    async fn enqueued_item_is_pending_with_zero_attempts() {
        let c = clock();
        let (_ctx, queue) = open_memory(c.clone()).await;
        let id = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("hello"))
            .await
            .unwrap();

        let item = queue.get(id).await.unwrap().unwrap();
        assert_eq!(item.state, ItemState::Pending);
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.created_at, c.now());
        assert_eq!(queue.locate(id).await.unwrap(), Some(Location::Active));
    }

    #[tokio::test]
    async fn ids_are_never_reused_after_items_leave() {
        let (_ctx, queue) = open_memory(clock()).await;
        let first = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("a"))
            .await
            .unwrap();
        queue.apply(first, 1, Transition::Delivered).await.unwrap();

        let second = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("b"))
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn empty_recipient_or_payload_rejected() {
        let (_ctx, queue) = open_memory(clock()).await;
        assert!(matches!(
            queue.enqueue(Recipient::new("  "), Payload::text("x")).await,
            Err(OutreachError::EmptyRecipient)
        ));
        assert!(matches!(
            queue.enqueue(Recipient::new("c"), Payload::text("   ")).await,
            Err(OutreachError::EmptyPayload)
        ));
        assert!(queue.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivered_moves_item_to_sent_log() {
        let (_ctx, queue) = open_memory(clock()).await;
        let id = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("hello"))
            .await
            .unwrap();

        assert!(queue.apply(id, 1, Transition::Delivered).await.unwrap());

        assert_eq!(queue.locate(id).await.unwrap(), Some(Location::Sent));
        assert!(queue.get(id).await.unwrap().is_none());
        let sent = queue.sent_log().await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attempt_count, 1);
        assert_eq!(sent[0].recipient.as_str(), "chat-1");
    }

    #[tokio::test]
    async fn dead_letter_keeps_payload_and_error() {
        let (_ctx, queue) = open_memory(clock()).await;
        let id = queue
            .enqueue(Recipient::new("chat-9"), Payload::text("bye"))
            .await
            .unwrap();

        queue
            .apply(
                id,
                1,
                Transition::DeadLetter {
                    error: "chat not found".to_string(),
                },
            )
            .await
            .unwrap();

        let record = queue.dead_letters().get(id).await.unwrap().unwrap();
        assert_eq!(record.payload, Payload::text("bye"));
        assert_eq!(record.last_error, "chat not found");
        assert_eq!(record.attempt_count, 1);
        assert_eq!(queue.locate(id).await.unwrap(), Some(Location::DeadLetter));
    }

    #[tokio::test]
    async fn retry_schedules_and_records_error() {
        let c = clock();
        let (_ctx, queue) = open_memory(c.clone()).await;
        let id = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("hello"))
            .await
            .unwrap();
        let at = c.now() + Duration::from_secs(4);

        queue
            .apply(
                id,
                1,
                Transition::Retry {
                    error: "429".to_string(),
                    next_attempt_at: at,
                },
            )
            .await
            .unwrap();

        let item = queue.get(id).await.unwrap().unwrap();
        assert_eq!(item.attempt_count, 1);
        assert_eq!(item.last_error.as_deref(), Some("429"));
        assert_eq!(item.state, ItemState::Scheduled { next_attempt_at: at });

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(stats.next_attempt_at, Some(at));
    }

    #[tokio::test]
    async fn apply_on_missing_item_is_noop() {
        let (_ctx, queue) = open_memory(clock()).await;
        assert!(!queue
            .apply(ItemId(99), 1, Transition::Delivered)
            .await
            .unwrap());
        assert!(queue.sent_log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_unique_refuses_pending_and_sent_duplicates() {
        let (_ctx, queue) = open_memory(clock()).await;
        let first = queue
            .enqueue_unique(Recipient::new("chat-1"), Payload::text("thanks"))
            .await
            .unwrap();
        let EnqueueOutcome::Enqueued(id) = first else {
            panic!("expected Enqueued, got {first:?}");
        };

        assert_eq!(
            queue
                .enqueue_unique(Recipient::new("chat-1"), Payload::text("thanks"))
                .await
                .unwrap(),
            EnqueueOutcome::AlreadyPending(id)
        );

        queue.apply(id, 1, Transition::Delivered).await.unwrap();
        assert_eq!(
            queue
                .enqueue_unique(Recipient::new("chat-1"), Payload::text("thanks"))
                .await
                .unwrap(),
            EnqueueOutcome::AlreadySent(id)
        );

        // A different recipient is a different message.
        assert!(matches!(
            queue
                .enqueue_unique(Recipient::new("chat-2"), Payload::text("thanks"))
                .await
                .unwrap(),
            EnqueueOutcome::Enqueued(_)
        ));
    }

    #[tokio::test]
    async fn enqueue_unique_sees_items_added_by_plain_enqueue() {
        let (_ctx, queue) = open_memory(clock()).await;
        let id = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("thanks"))
            .await
            .unwrap();
        assert!(queue.get(id).await.unwrap().unwrap().idempotency_key.is_some());

        assert_eq!(
            queue
                .enqueue_unique(Recipient::new("chat-1"), Payload::text("thanks"))
                .await
                .unwrap(),
            EnqueueOutcome::AlreadyPending(id)
        );

        queue.apply(id, 1, Transition::Delivered).await.unwrap();
        assert_eq!(
            queue
                .enqueue_unique(Recipient::new("chat-1"), Payload::text("thanks"))
                .await
                .unwrap(),
            EnqueueOutcome::AlreadySent(id)
        );
    }

    #[tokio::test]
    async fn open_drops_active_entries_already_sent() {
        let c = clock();
        let ctx = StorageContext::in_memory();
        let item = OutreachItem {
            id: ItemId(3),
            recipient: Recipient::new("chat-3"),
            payload: Payload::text("hello"),
            state: ItemState::Pending,
            attempt_count: 0,
            last_error: None,
            created_at: c.now(),
            idempotency_key: None,
        };

        // State left by a crash after the sent log was written but before
        // the active set was.
        let mut active = ActiveQueue::default();
        active.last_id = 3;
        active.items.insert(ItemId(3), item);
        ctx.store()
            .collection::<ActiveQueue>(QUEUE_COLLECTION)
            .unwrap()
            .write(&active)
            .await
            .unwrap();
        let mut sent = SentLog::new();
        sent.insert(
            ItemId(3),
            SentRecord {
                id: ItemId(3),
                recipient: Recipient::new("chat-3"),
                delivered_at: c.now(),
                attempt_count: 1,
                idempotency_key: None,
            },
        );
        ctx.store()
            .collection::<SentLog>(SENT_COLLECTION)
            .unwrap()
            .write(&sent)
            .await
            .unwrap();

        let queue = OutreachQueue::open(&ctx, c).await.unwrap();
        assert!(queue.snapshot().await.unwrap().is_empty());
        assert_eq!(queue.locate(ItemId(3)).await.unwrap(), Some(Location::Sent));
    }

    #[tokio::test]
    async fn read_only_handle_never_writes() {
        let c = clock();
        let (ctx, queue) = open_memory(c.clone()).await;
        let id = queue
            .enqueue(Recipient::new("chat-1"), Payload::text("hello"))
            .await
            .unwrap();

        let view = OutreachQueue::open_read_only(&ctx, c).await.unwrap();
        assert_eq!(view.stats().await.unwrap().pending, 1);
        assert_eq!(view.locate(id).await.unwrap(), Some(Location::Active));
        assert!(matches!(
            view.enqueue(Recipient::new("chat-2"), Payload::text("x")).await,
            Err(OutreachError::ReadOnly)
        ));
        assert!(matches!(
            view.apply(id, 1, Transition::Delivered).await,
            Err(OutreachError::ReadOnly)
        ));
        assert_eq!(queue.locate(id).await.unwrap(), Some(Location::Active));
    }

    #[tokio::test]
    async fn read_only_open_leaves_interrupted_moves_on_disk() {
        let c = clock();
        let ctx = StorageContext::in_memory();
        let mut active = ActiveQueue::default();
        active.last_id = 5;
        active.items.insert(
            ItemId(5),
            OutreachItem {
                id: ItemId(5),
                recipient: Recipient::new("chat-5"),
                payload: Payload::text("hello"),
                state: ItemState::Pending,
                attempt_count: 0,
                last_error: None,
                created_at: c.now(),
                idempotency_key: None,
            },
        );
        let queue_file = ctx
            .store()
            .collection::<ActiveQueue>(QUEUE_COLLECTION)
            .unwrap();
        queue_file.write(&active).await.unwrap();
        let mut sent = SentLog::new();
        sent.insert(
            ItemId(5),
            SentRecord {
                id: ItemId(5),
                recipient: Recipient::new("chat-5"),
                delivered_at: c.now(),
                attempt_count: 1,
                idempotency_key: None,
            },
        );
        ctx.store()
            .collection::<SentLog>(SENT_COLLECTION)
            .unwrap()
            .write(&sent)
            .await
            .unwrap();

        OutreachQueue::open_read_only(&ctx, c.clone()).await.unwrap();
        assert!(queue_file.read().await.unwrap().items.contains_key(&ItemId(5)));

        OutreachQueue::open(&ctx, c).await.unwrap();
        assert!(queue_file.read().await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn open_raises_last_id_above_finished_items() {
        let c = clock();
        let ctx = StorageContext::in_memory();
        let mut dead = DeadLetterLog::new();
        dead.insert(
            ItemId(41),
            DeadLetterRecord {
                id: ItemId(41),
                recipient: Recipient::new("chat"),
                payload: Payload::text("x"),
                attempt_count: 6,
                last_error: "gave up".to_string(),
                created_at: c.now(),
                dead_at: c.now(),
                idempotency_key: None,
            },
        );
        ctx.store()
            .collection::<DeadLetterLog>(crate::dead_letter::DEAD_LETTER_COLLECTION)
            .unwrap()
            .write(&dead)
            .await
            .unwrap();

        // The active queue file is gone; ids must still not collide.
        let queue = OutreachQueue::open(&ctx, c).await.unwrap();
        let id = queue
            .enqueue(Recipient::new("chat"), Payload::text("y"))
            .await
            .unwrap();
        assert_eq!(id, ItemId(42));
    }

    #[tokio::test]
    async fn state_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = relaybot_storage::StorageRootResolver::new(
            vec![relaybot_storage::RootCandidate::new(
                "STORAGE_DIR",
                Some(dir.path().to_string_lossy().to_string()),
            )],
            "data",
        );
        let c = clock();

        let id = {
            let ctx = StorageContext::open(&root).unwrap();
            let queue = OutreachQueue::open(&ctx, c.clone()).await.unwrap();
            queue
                .enqueue(Recipient::new("chat-1"), Payload::text("survive me"))
                .await
                .unwrap()
        };

        let ctx = StorageContext::open(&root).unwrap();
        let queue = OutreachQueue::open(&ctx, c).await.unwrap();
        let item = queue.get(id).await.unwrap().unwrap();
        assert_eq!(item.payload, Payload::text("survive me"));
        assert!(dir.path().join("outreach_queue.json").is_file());
    }

    #[tokio::test]
    async fn malformed_dead_letter_file_refuses_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("outreach_dead.json"), "{\"1\": {").unwrap();
        let root = relaybot_storage::StorageRootResolver::new(
            vec![relaybot_storage::RootCandidate::new(
                "STORAGE_DIR",
                Some(dir.path().to_string_lossy().to_string()),
            )],
            "data",
        );
        let ctx = StorageContext::open(&root).unwrap();

        match OutreachQueue::open(&ctx, clock()).await {
            Err(OutreachError::Storage(StorageError::Malformed { name, .. })) => {
                assert_eq!(name, "outreach_dead")
            }
            Err(other) => panic!("expected Malformed, got {other:?}"),
            Ok(_) => panic!("expected Malformed, got a queue"),
        }
    }
}
