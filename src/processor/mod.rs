//! Partitioned stateful stream processing.
//!
//! A `Processor` consumes one input topic and folds every record into a
//! per-key state held in a `TableStore`. Each partition is worked by its
//! own task, so records of one key are folded strictly in log order while
//! different partitions progress independently.
//!
//! Per record:
//! 1. load the key's state (or the fold's initial state)
//! 2. apply the fold
//! 3. persist the new state and append it to the group's changelog topic
//! 4. commit `offset + 1`
//! 5. run the fold's side effects
//!
//! The state commit and the side effects are not atomic. A crash between
//! steps 4 and 5 drops the side effects of that record; a crash before 4
//! folds the record again on restart.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{table_topic, EventLog, LogError, Record};
use crate::codec::{Codec, CodecError};
use crate::config::EmitterConfig;
use crate::emitter::{EmitError, Emitter};
use crate::scheduler::SchedulerError;
use crate::storage::{OffsetStore, StorageError, Stores, TableStore};

mod balance;
mod windowed;

pub use balance::BalanceFold;
pub use windowed::WindowedFold;

/// Decoded event type of a fold.
pub type EventOf<F> = <<F as Fold>::EventCodec as Codec>::Value;
/// State type of a fold.
pub type StateOf<F> = <<F as Fold>::StateCodec as Codec>::Value;

/// A fold refused an event. The record is skipped.
#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    #[error("Negative deposit {delta} for key '{key}'")]
    NegativeDeposit { key: String, delta: i64 },

    #[error("Amount {amount} + {delta} overflows for key '{key}'")]
    Overflow { key: String, amount: u64, delta: i64 },
}

/// A side effect failed after its record was committed.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("Forward failed: {0}")]
    Emit(#[from] EmitError),

    #[error("Scheduling failed: {0}")]
    Schedule(#[from] SchedulerError),
}

/// Errors that stop a partition worker.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stored state for key '{key}' in group '{group}' is corrupt: {source}")]
    CorruptState {
        group: String,
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("Changelog append failed: {0}")]
    Changelog(#[from] EmitError),
}

/// What a committed record produced, handed to `Fold::after_commit`.
pub struct Commit<'a, F: Fold> {
    pub record: &'a Record,
    pub event: &'a EventOf<F>,
    pub state: &'a StateOf<F>,
}

/// Deterministic per-key fold over an event stream.
#[async_trait]
pub trait Fold: Sized + Send + Sync + 'static {
    type EventCodec: Codec;
    type StateCodec: Codec;

    /// State of a key that has no record yet.
    fn initial(&self, key: &str) -> StateOf<Self>;

    /// Compute the next state. Must not have side effects.
    fn apply(
        &self,
        key: &str,
        state: StateOf<Self>,
        event: &EventOf<Self>,
    ) -> Result<StateOf<Self>, FoldError>;

    /// Side effects of a record, run once its state and offset are committed.
    async fn after_commit(&self, _commit: &Commit<'_, Self>) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Consumes one topic and maintains a group table from it.
pub struct Processor<F: Fold> {
    group: String,
    topic: String,
    fold: F,
    log: Arc<dyn EventLog>,
    tables: Arc<dyn TableStore>,
    offsets: Arc<dyn OffsetStore>,
    changelog: Emitter,
    events: F::EventCodec,
    states: F::StateCodec,
}

impl<F: Fold> Processor<F> {
    /// A processor for `group`, consuming `topic`.
    ///
    /// The group's table is replicated to the `"{group}-table"` topic.
    pub fn new(
        group: impl Into<String>,
        topic: impl Into<String>,
        fold: F,
        log: Arc<dyn EventLog>,
        stores: &Stores,
        emitter_config: &EmitterConfig,
    ) -> Self {
        let group = group.into();
        let changelog = Emitter::new(log.clone(), table_topic(&group), emitter_config);
        Self {
            topic: topic.into(),
            fold,
            log,
            tables: stores.tables.clone(),
            offsets: stores.offsets.clone(),
            changelog,
            events: F::EventCodec::default(),
            states: F::StateCodec::default(),
            group,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Spawn one worker per partition of the input topic.
    pub async fn start(self) -> Result<ProcessorHandle, ProcessorError> {
        let partitions = self.log.partitions(&self.topic).await?;
        let group = self.group.clone();
        let processor = Arc::new(self);

        let workers = (0..partitions)
            .map(|partition| {
                let processor = processor.clone();
                tokio::spawn(async move {
                    let result = processor.run_partition(partition).await;
                    if let Err(e) = &result {
                        error!(
                            group = %processor.group,
                            partition,
                            error = %e,
                            "Partition worker stopped"
                        );
                    }
                    result
                })
            })
            .collect();

        info!(group = %group, partitions, "Processor started");
        Ok(ProcessorHandle { group, workers })
    }

    async fn run_partition(&self, partition: u32) -> Result<(), ProcessorError> {
        let from = self
            .offsets
            .get(&self.group, &self.topic, partition)
            .await?
            .unwrap_or(0);

        let watermark = self.log.high_watermark(&self.topic, partition).await?;
        let from = if from > watermark {
            warn!(
                group = %self.group,
                partition,
                committed = from,
                watermark,
                "Committed offset is past the end of the log, reading from the beginning"
            );
            0
        } else {
            from
        };

        debug!(group = %self.group, partition, from, "Partition worker resuming");

        let mut records = self.log.consume(&self.topic, partition, from).await?;
        while let Some(record) = records.next().await {
            self.process(&record?).await?;
        }
        Ok(())
    }

    /// Fold one record into the table.
    #[tracing::instrument(
        name = "processor.process",
        skip_all,
        fields(group = %self.group, partition = record.partition, offset = record.offset, key = %record.key)
    )]
    pub(crate) async fn process(&self, record: &Record) -> Result<(), ProcessorError> {
        let event = match self.events.decode(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Malformed payload, skipping record");
                return self.commit(record).await;
            }
        };

        let state = match self.tables.get(&self.group, &record.key).await? {
            Some(bytes) => {
                self.states
                    .decode(&bytes)
                    .map_err(|source| ProcessorError::CorruptState {
                        group: self.group.clone(),
                        key: record.key.clone(),
                        source,
                    })?
            }
            None => self.fold.initial(&record.key),
        };

        let state = match self.fold.apply(&record.key, state, &event) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Event rejected, skipping record");
                return self.commit(record).await;
            }
        };

        let encoded = self.states.encode(&state);
        self.tables
            .put(&self.group, &record.key, encoded.clone())
            .await?;
        self.changelog.emit(&record.key, encoded).await?;
        self.commit(record).await?;

        let commit = Commit {
            record,
            event: &event,
            state: &state,
        };
        if let Err(e) = self.fold.after_commit(&commit).await {
            error!(error = %e, "Side effect failed after commit");
        }
        Ok(())
    }

    async fn commit(&self, record: &Record) -> Result<(), ProcessorError> {
        self.offsets
            .put(&self.group, &self.topic, record.partition, record.offset + 1)
            .await?;
        Ok(())
    }
}

/// Running partition workers of one processor.
pub struct ProcessorHandle {
    group: String,
    workers: Vec<JoinHandle<Result<(), ProcessorError>>>,
}

impl ProcessorHandle {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Number of workers still running.
    pub fn running(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Stop all workers.
    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
