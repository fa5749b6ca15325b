//! The delivery worker.
//!
//! One loop, one in-flight attempt at a time. Each iteration reads the
//! active set, attempts every due item oldest first, and commits each
//! outcome before moving on. No collection lock is held while the sender
//! runs.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backoff::RetryPolicy;
use crate::error::OutreachError;
use crate::model::OutreachItem;
use crate::queue::{OutreachQueue, Transition};
use crate::sender::{DeliveryError, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,
    /// Minimum gap between any two delivery attempts, across all items.
    pub min_interval: Duration,
    /// Longest idle wait when nothing is due.
    pub poll_interval: Duration,
    /// Bound on a single sender call. Expiry counts as a retryable failure.
    pub send_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            retry: RetryPolicy::default(),
            min_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
            send_timeout: Duration::from_secs(35),
        }
    }
}

/// Tally of attempts made by [`DeliveryWorker::drain_once`] or
/// [`DeliveryWorker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl DrainReport {
    fn record(&mut self, transition: &Transition) {
        self.attempted += 1;
        match transition {
            Transition::Delivered => self.delivered += 1,
            Transition::Retry { .. } => self.retried += 1,
            Transition::DeadLetter { .. } => self.dead_lettered += 1,
        }
    }

    fn merge(&mut self, other: DrainReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Receiving side of the shutdown signal. Dropping every
/// [`ShutdownTrigger`] also counts as a shutdown request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

pub struct DeliveryWorker {
    queue: OutreachQueue,
    sender: Arc<dyn Sender>,
    config: WorkerConfig,
    rng: StdRng,
    last_attempt: Option<Instant>,
}

impl DeliveryWorker {
    pub fn new(queue: OutreachQueue, sender: Arc<dyn Sender>, config: WorkerConfig) -> Self {
        DeliveryWorker {
            queue,
            sender,
            config,
            rng: StdRng::from_entropy(),
            last_attempt: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Attempt every item that is due right now, then return.
    pub async fn drain_once(&mut self) -> Result<DrainReport, OutreachError> {
        let ready = self.queue.plan().await?.into_ready();
        let mut report = DrainReport::default();
        for item in ready {
            self.pace().await;
            if let Some(transition) = self.attempt(item).await? {
                report.record(&transition);
            }
        }
        Ok(report)
    }

    /// Deliver until `shutdown` fires.
    ///
    /// Shutdown is observed while idle and while waiting out the minimum
    /// interval, never during a send: an in-flight attempt always completes
    /// (or times out) and its outcome is committed.
    /// Storage errors stop the loop; reopening the queue reconciles any
    /// half-applied move.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<DrainReport, OutreachError> {
        let wakeup = self.queue.wakeup();
        let mut total = DrainReport::default();
        tracing::info!(
            ceiling = self.config.retry.ceiling,
            min_interval_ms = self.config.min_interval.as_millis() as u64,
            "delivery worker started"
        );

        while !shutdown.is_triggered() {
            let schedule = self.queue.plan().await?;
            if schedule.ready().is_empty() {
                let wait = schedule.idle_wait(self.queue.clock().now(), self.config.poll_interval);
                tracing::trace!(wait_ms = wait.as_millis() as u64, "worker idle");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = wakeup.notified() => {}
                    _ = shutdown.triggered() => break,
                }
                continue;
            }

            let mut pass = DrainReport::default();
            for item in schedule.into_ready() {
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => break,
                    _ = self.pace() => {}
                }
                if let Some(transition) = self.attempt(item).await? {
                    pass.record(&transition);
                }
            }
            total.merge(pass);
        }

        tracing::info!(
            attempted = total.attempted,
            delivered = total.delivered,
            retried = total.retried,
            dead_lettered = total.dead_lettered,
            "delivery worker stopped"
        );
        Ok(total)
    }

    async fn attempt(&mut self, item: OutreachItem) -> Result<Option<Transition>, OutreachError> {
        let attempt_count = item.attempt_count.saturating_add(1);
        let outcome = tokio::time::timeout(
            self.config.send_timeout,
            self.sender.send(&item.recipient, &item.payload),
        )
        .await
        .unwrap_or_else(|_| {
            Err(DeliveryError::Retryable(format!(
                "send timed out after {}ms",
                self.config.send_timeout.as_millis()
            )))
        });
        self.last_attempt = Some(Instant::now());

        let transition = match outcome {
            Ok(()) => {
                tracing::info!(item_id = %item.id, recipient = %item.recipient, attempt_count, "outreach delivered");
                Transition::Delivered
            }
            Err(DeliveryError::Retryable(error)) if self.config.retry.allows_retry(attempt_count) => {
                let delay = self.config.retry.delay(attempt_count, &mut self.rng);
                let next_attempt_at = self.queue.clock().now() + delay;
                tracing::warn!(
                    item_id = %item.id,
                    attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "delivery failed, retry scheduled"
                );
                Transition::Retry {
                    error,
                    next_attempt_at,
                }
            }
            Err(err) => {
                let error = err.message().to_string();
                tracing::error!(
                    item_id = %item.id,
                    attempt_count,
                    retryable = err.is_retryable(),
                    %error,
                    "delivery failed, moved to dead letters"
                );
                Transition::DeadLetter { error }
            }
        };

        if self
            .queue
            .apply(item.id, attempt_count, transition.clone())
            .await?
        {
            Ok(Some(transition))
        } else {
            Ok(None)
        }
    }

    /// Global rate limit between attempts. Callers pace before every
    /// `attempt`.
    async fn pace(&self) {
        if let Some(last) = self.last_attempt {
            tokio::time::sleep_until(last + self.config.min_interval).await;
        }
    }
}
