//! Durable outreach delivery.
//!
//! Producers call [`OutreachQueue::enqueue`]; a single [`DeliveryWorker`]
//! attempts due items through a [`Sender`], retrying transient failures
//! with backoff and moving everything else to the sent log or the
//! [`DeadLetterStore`]. Delivery is at-least-once: a crash after the sender
//! accepts a message but before the sent log is written redelivers it.

mod backoff;
mod dead_letter;
mod error;
mod model;
mod queue;
mod schedule;
mod sender;
mod worker;

pub use backoff::RetryPolicy;
pub use dead_letter::{DeadLetterStore, DEAD_LETTER_COLLECTION};
pub use error::OutreachError;
pub use model::{
    idempotency_key, DeadLetterRecord, ItemId, ItemState, Location, OutreachItem, Payload,
    Recipient, RenderError, SentRecord,
};
pub use queue::{EnqueueOutcome, OutreachQueue, QueueStats, QUEUE_COLLECTION, SENT_COLLECTION};
pub use schedule::WakeupSchedule;
pub use sender::{DeliveryError, Sender};
pub use worker::{shutdown_channel, DeliveryWorker, DrainReport, Shutdown, ShutdownTrigger, WorkerConfig};
