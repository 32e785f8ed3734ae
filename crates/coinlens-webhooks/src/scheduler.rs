//! Retry timing: backoff schedule and the armed-timer queue.
//!
//! Every scheduled retry is a tokio sleep task tracked by delivery id, so
//! deleting or deactivating a subscription can abort its outstanding timers
//! deterministically instead of leaving orphans to fire against a dead
//! webhook. Fired timers push the delivery id onto a channel drained by
//! [`crate::worker::RetryWorker`]; within one logical event the next attempt
//! is only armed after the previous record is written, which keeps attempts
//! strictly sequential.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

struct TimerEntry {
    webhook_id: Uuid,
    handle: tokio::task::JoinHandle<()>,
}

/// Computes backoff delays and arms cancellable retry timers.
pub struct RetryScheduler {
    schedule: Vec<Duration>,
    max_attempts: u32,
    timers: Mutex<HashMap<Uuid, TimerEntry>>,
    tx: mpsc::UnboundedSender<Uuid>,
}

impl RetryScheduler {
    /// Returns the scheduler and the receiver of due delivery ids.
    pub fn new(
        schedule: Vec<Duration>,
        max_attempts: u32,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                schedule,
                max_attempts,
                timers: Mutex::new(HashMap::new()),
                tx,
            }),
            rx,
        )
    }

    /// Maximum attempts per logical event. Reaching it without success is
    /// fatal for that event; there is no automatic recovery past this point.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    ///
    /// Indexes the backoff table, clamping to the last entry once attempts
    /// outrun it.
    #[must_use]
    pub fn next_delay(&self, failed_attempt: u32) -> Duration {
        let idx = failed_attempt.saturating_sub(1) as usize;
        self.schedule
            .get(idx)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Arm a timer that will surface `delivery_id` for re-execution.
    ///
    /// Returns the wall-clock time the retry is due.
    pub fn schedule_retry(
        self: &Arc<Self>,
        webhook_id: Uuid,
        delivery_id: Uuid,
        failed_attempt: u32,
    ) -> DateTime<Utc> {
        let delay = self.next_delay(failed_attempt);
        let due_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(delivery_id);
        });

        let previous = self
            .timers
            .lock()
            .unwrap()
            .insert(delivery_id, TimerEntry { webhook_id, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }

        tracing::debug!(
            target: "webhook_delivery",
            delivery_id = %delivery_id,
            webhook_id = %webhook_id,
            delay_ms = delay.as_millis() as u64,
            "Scheduled retry"
        );

        due_at
    }

    fn fire(&self, delivery_id: Uuid) {
        self.timers.lock().unwrap().remove(&delivery_id);
        // Receiver gone means the worker stopped; nothing left to notify.
        let _ = self.tx.send(delivery_id);
    }

    /// Abort one armed timer. Returns whether a timer existed.
    pub fn cancel(&self, delivery_id: Uuid) -> bool {
        match self.timers.lock().unwrap().remove(&delivery_id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every armed timer belonging to a webhook; returns how many.
    ///
    /// Called on subscription delete/deactivate so no orphaned timer fires
    /// a delivery attempt against a dead subscription.
    pub fn cancel_for_webhook(&self, webhook_id: Uuid) -> usize {
        let mut timers = self.timers.lock().unwrap();
        let ids: Vec<Uuid> = timers
            .iter()
            .filter(|(_, entry)| entry.webhook_id == webhook_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(entry) = timers.remove(id) {
                entry.handle.abort();
            }
        }
        ids.len()
    }

    /// Number of currently armed timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }
}
