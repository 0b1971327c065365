//! Delayed compensations for the sliding window.
//!
//! Every positive contribution to the windowed accumulator is paired with a
//! compensation that subtracts it again once the decay window has elapsed.
//! Compensations are persisted before their timer is armed, so a durable
//! `CompensationStore` lets `recover()` re-arm them after a restart.
//! Overdue compensations fire immediately.
//!
//! A compensation cannot be cancelled. `shutdown` only disarms timers; the
//! compensations stay stored and fire after the next `recover()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::Record;
use crate::emitter::Emitter;
use crate::storage::{CompensationStore, StorageError};

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur while scheduling or recovering compensations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Compensation storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A pending compensating event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compensation {
    /// See `compensation_id`.
    pub id: String,
    pub key: String,
    /// The delta emitted when it fires (negative).
    pub delta: i64,
    pub fire_at: DateTime<Utc>,
}

/// Identifier of the compensation caused by `record`:
/// `"{topic}/{partition}/{offset}@{timestamp_millis}"`.
///
/// Reprocessing the same record yields the same id. The append timestamp
/// keeps a record of a recreated log from colliding with a pending
/// compensation of the old log at the same offset.
pub fn compensation_id(record: &Record) -> String {
    format!(
        "{}/{}/{}@{}",
        record.topic,
        record.partition,
        record.offset,
        record.timestamp.timestamp_millis()
    )
}

struct Inner {
    emitter: Emitter,
    store: Arc<dyn CompensationStore>,
    window: Duration,
    armed: Mutex<HashMap<String, JoinHandle<()>>>,
}

/// Arms in-process timers for compensations and emits them when due.
///
/// Cheap to clone; clones share timers and store.
#[derive(Clone)]
pub struct DecayScheduler {
    inner: Arc<Inner>,
}

impl DecayScheduler {
    /// `emitter` must write to the windowed topic.
    pub fn new(emitter: Emitter, store: Arc<dyn CompensationStore>, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                emitter,
                store,
                window,
                armed: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Schedule `-contribution` for `key`, one decay window from now.
    ///
    /// An id that is already armed is left untouched, stored entry and
    /// deadline included. Scheduling a stored but unarmed id replaces it.
    #[tracing::instrument(name = "scheduler.schedule", skip_all, fields(%id, %key, contribution))]
    pub async fn schedule(&self, id: String, key: &str, contribution: i64) -> Result<()> {
        let already_armed = self.inner.armed().contains_key(&id);
        if already_armed {
            debug!("Compensation already armed, keeping original deadline");
            return Ok(());
        }

        let window = self.inner.window;
        let fire_at = Utc::now()
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let compensation = Compensation {
            id,
            key: key.to_string(),
            delta: -contribution,
            fire_at,
        };

        self.inner.store.put(&compensation).await?;
        self.arm(compensation, window);
        Ok(())
    }

    /// Re-arm every stored compensation.
    ///
    /// Returns the number of timers armed by this call.
    pub async fn recover(&self) -> Result<usize> {
        let stored = self.inner.store.list().await?;
        let now = Utc::now();

        let mut armed = 0;
        for compensation in stored {
            let delay = (compensation.fire_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if self.arm(compensation, delay) {
                armed += 1;
            }
        }

        if armed > 0 {
            info!(count = armed, "Recovered pending compensations");
        }
        Ok(armed)
    }

    /// Number of armed timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.inner.armed().len()
    }

    /// Disarm all timers. Their compensations stay stored for `recover()`.
    pub fn shutdown(&self) {
        let mut armed = self.inner.armed();
        let disarmed = armed.len();
        for (_, timer) in armed.drain() {
            timer.abort();
        }
        if disarmed > 0 {
            info!(count = disarmed, "Disarmed pending compensations");
        }
    }

    fn arm(&self, compensation: Compensation, delay: Duration) -> bool {
        let mut armed = self.inner.armed();
        if armed.contains_key(&compensation.id) {
            debug!(id = %compensation.id, "Compensation already armed");
            return false;
        }

        // The timer removes itself once done; holding the lock until it is
        // registered keeps that removal from racing the insert.
        let id = compensation.id.clone();
        let inner = self.inner.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(&compensation).await;
            inner.armed().remove(&compensation.id);
        });
        armed.insert(id, timer);
        true
    }
}

impl Inner {
    fn armed(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(&self, compensation: &Compensation) {
        match self
            .emitter
            .emit_delta(&compensation.key, compensation.delta)
            .await
        {
            Ok(_) => {
                debug!(
                    id = %compensation.id,
                    key = %compensation.key,
                    delta = compensation.delta,
                    "Compensation fired"
                );
                if let Err(e) = self.store.remove(&compensation.id).await {
                    error!(id = %compensation.id, error = %e, "Failed to remove fired compensation");
                }
            }
            Err(e) => {
                error!(
                    id = %compensation.id,
                    key = %compensation.key,
                    error = %e,
                    "Compensation emit failed, kept for next recovery"
                );
            }
        }
    }
}
