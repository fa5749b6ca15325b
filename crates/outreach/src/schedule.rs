//! What the worker should do next: which items are due now, and when the
//! next scheduled one wakes up.

use std::collections::BTreeSet;
use std::time::Duration;

use time::OffsetDateTime;

use crate::model::{ItemId, ItemState, OutreachItem};

#[derive(Debug, Clone, Default)]
pub struct WakeupSchedule {
    /// Due items, oldest `created_at` first (ties broken by id).
    ready: Vec<OutreachItem>,
    /// Not-yet-due items keyed by when they become due.
    upcoming: BTreeSet<(OffsetDateTime, ItemId)>,
}

impl WakeupSchedule {
    pub fn build(items: impl IntoIterator<Item = OutreachItem>, now: OffsetDateTime) -> Self {
        let mut ready = Vec::new();
        let mut upcoming = BTreeSet::new();

        for item in items {
            match item.state {
                ItemState::Scheduled { next_attempt_at } if next_attempt_at > now => {
                    upcoming.insert((next_attempt_at, item.id));
                }
                _ => ready.push(item),
            }
        }
        ready.sort_by_key(|item| (item.created_at, item.id));

        WakeupSchedule { ready, upcoming }
    }

    pub fn ready(&self) -> &[OutreachItem] {
        &self.ready
    }

    pub fn into_ready(self) -> Vec<OutreachItem> {
        self.ready
    }

    pub fn next_wakeup(&self) -> Option<OffsetDateTime> {
        self.upcoming.first().map(|(at, _)| *at)
    }

    /// How long to idle when nothing is ready: until the earliest scheduled
    /// item, but never longer than `poll_interval`.
    pub fn idle_wait(&self, now: OffsetDateTime, poll_interval: Duration) -> Duration {
        match self.next_wakeup() {
            Some(at) => Duration::try_from(at - now)
                .unwrap_or(Duration::ZERO)
                .min(poll_interval),
            None => poll_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payload, Recipient};
    use time::macros::datetime;

    fn item(id: u64, created_at: OffsetDateTime, state: ItemState) -> OutreachItem {
        OutreachItem {
            id: ItemId(id),
            recipient: Recipient::new(format!("chat-{id}")),
            payload: Payload::text("hello"),
            state,
            attempt_count: 0,
            last_error: None,
            created_at,
            idempotency_key: None,
        }
    }

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    #[test]
    fn ready_items_ordered_oldest_first() {
        let schedule = WakeupSchedule::build(
            vec![
                item(3, datetime!(2025-06-01 11:30 UTC), ItemState::Pending),
                item(1, datetime!(2025-06-01 11:50 UTC), ItemState::Pending),
                item(
                    2,
                    datetime!(2025-06-01 11:00 UTC),
                    ItemState::Scheduled {
                        next_attempt_at: datetime!(2025-06-01 11:59 UTC),
                    },
                ),
            ],
            NOW,
        );
        let ids: Vec<u64> = schedule.ready().iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(schedule.next_wakeup(), None);
    }

    #[test]
    fn equal_created_at_falls_back_to_id() {
        let t = datetime!(2025-06-01 11:00 UTC);
        let schedule = WakeupSchedule::build(
            vec![
                item(5, t, ItemState::Pending),
                item(4, t, ItemState::Pending),
            ],
            NOW,
        );
        let ids: Vec<u64> = schedule.ready().iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn future_items_set_next_wakeup() {
        let schedule = WakeupSchedule::build(
            vec![
                item(
                    1,
                    datetime!(2025-06-01 11:00 UTC),
                    ItemState::Scheduled {
                        next_attempt_at: datetime!(2025-06-01 12:10 UTC),
                    },
                ),
                item(
                    2,
                    datetime!(2025-06-01 11:00 UTC),
                    ItemState::Scheduled {
                        next_attempt_at: datetime!(2025-06-01 12:00:30 UTC),
                    },
                ),
            ],
            NOW,
        );
        assert!(schedule.ready().is_empty());
        assert_eq!(
            schedule.next_wakeup(),
            Some(datetime!(2025-06-01 12:00:30 UTC))
        );
        assert_eq!(
            schedule.idle_wait(NOW, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
        assert_eq!(
            schedule.idle_wait(NOW, Duration::from_secs(60)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn idle_wait_defaults_to_poll_interval() {
        let schedule = WakeupSchedule::build(Vec::new(), NOW);
        assert_eq!(
            schedule.idle_wait(NOW, Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }
}
