//! Read replicas of processor tables.
//!
//! A `View` consumes a group's changelog topic from the beginning and keeps
//! the latest state per key in memory. It never writes. Lookups are
//! eventually consistent with the processor: a read straight after a
//! deposit may not see it yet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::{table_topic, EventLog, LogError};
use crate::codec::{Codec, WalletCodec};

/// View over wallet tables.
pub type WalletView = View<WalletCodec>;

type Entries<V> = Arc<RwLock<HashMap<String, V>>>;

/// Counts partitions still replaying towards their start-up watermark.
struct Recovery {
    remaining: AtomicUsize,
    recovered: watch::Sender<bool>,
}

impl Recovery {
    fn partition_caught_up(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.recovered.send_replace(true);
        }
    }
}

/// In-memory replica of one group table.
pub struct View<C: Codec> {
    group: String,
    entries: Entries<C::Value>,
    recovered: watch::Receiver<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl<C: Codec> View<C>
where
    C::Value: Clone,
{
    /// Start replicating the changelog of `group`.
    ///
    /// The view counts as recovered once every partition has replayed up to
    /// the high watermark observed here.
    pub async fn start(log: Arc<dyn EventLog>, group: &str) -> Result<Self, LogError> {
        let topic = table_topic(group);
        let partitions = log.partitions(&topic).await?;

        let (tx, rx) = watch::channel(false);
        let recovery = Arc::new(Recovery {
            remaining: AtomicUsize::new(partitions as usize),
            recovered: tx,
        });
        let entries: Entries<C::Value> = Arc::new(RwLock::new(HashMap::new()));

        let mut workers = Vec::with_capacity(partitions as usize);
        for partition in 0..partitions {
            let watermark = log.high_watermark(&topic, partition).await?;
            workers.push(tokio::spawn(replicate::<C>(
                log.clone(),
                topic.clone(),
                partition,
                watermark,
                entries.clone(),
                recovery.clone(),
            )));
        }

        info!(group, %topic, partitions, "View started");
        Ok(Self {
            group: group.to_string(),
            entries,
            recovered: rx,
            workers,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Latest replicated state for `key`.
    pub async fn get(&self, key: &str) -> Option<C::Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Whether the start-up replay has completed.
    pub fn is_recovered(&self) -> bool {
        *self.recovered.borrow()
    }

    /// Wait until the start-up replay has completed.
    pub async fn wait_recovered(&self) {
        let mut recovered = self.recovered.clone();
        // The sender lives as long as the workers; if they are gone there
        // is nothing left to wait for.
        let _ = recovered.wait_for(|done| *done).await;
    }
}

impl<C: Codec> Drop for View<C> {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn replicate<C: Codec>(
    log: Arc<dyn EventLog>,
    topic: String,
    partition: u32,
    watermark: u64,
    entries: Entries<C::Value>,
    recovery: Arc<Recovery>,
) {
    let codec = C::default();
    let mut caught_up = watermark == 0;
    if caught_up {
        recovery.partition_caught_up();
    }

    let mut records = match log.consume(&topic, partition, 0).await {
        Ok(records) => records,
        Err(e) => {
            error!(%topic, partition, error = %e, "View consumer failed to start");
            return;
        }
    };

    while let Some(record) = records.next().await {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                error!(%topic, partition, error = %e, "View consumer stopped");
                return;
            }
        };

        match codec.decode(&record.payload) {
            Ok(value) => {
                entries.write().await.insert(record.key.clone(), value);
            }
            Err(e) => {
                error!(
                    %topic,
                    partition,
                    offset = record.offset,
                    key = %record.key,
                    error = %e,
                    "Undecodable changelog record, skipping"
                );
            }
        }

        if !caught_up && record.offset + 1 >= watermark {
            caught_up = true;
            debug!(%topic, partition, watermark, "View partition caught up");
            recovery.partition_caught_up();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::bus::{MemoryLog, TopicManager};
    use crate::codec::WalletState;
    use crate::test_utils::eventually;

    async fn changelog(partitions: u32) -> Arc<MemoryLog> {
        let log = Arc::new(MemoryLog::new());
        log.ensure_topic("wallet-table", partitions).await.unwrap();
        log
    }

    async fn append_state(log: &MemoryLog, key: &str, amount: u64) {
        let state = WalletState::new(key, amount);
        log.append("wallet-table", key, WalletCodec.encode(&state))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_changelog_is_recovered_immediately() {
        let log = changelog(4).await;
        let view = WalletView::start(log, "wallet").await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), view.wait_recovered())
            .await
            .unwrap();
        assert!(view.is_recovered());
        assert_eq!(view.get("w1").await, None);
    }

    #[tokio::test]
    async fn test_replays_history_latest_wins() {
        let log = changelog(2).await;
        append_state(&log, "w1", 5000).await;
        append_state(&log, "w2", 10000).await;
        append_state(&log, "w1", 11000).await;

        let view = WalletView::start(log, "wallet").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), view.wait_recovered())
            .await
            .unwrap();

        assert_eq!(view.get("w1").await, Some(WalletState::new("w1", 11000)));
        assert_eq!(view.get("w2").await, Some(WalletState::new("w2", 10000)));
        assert_eq!(view.group(), "wallet");
    }

    #[tokio::test]
    async fn test_follows_new_records() {
        let log = changelog(1).await;
        let view = WalletView::start(log.clone(), "wallet").await.unwrap();
        view.wait_recovered().await;

        append_state(&log, "w1", 42).await;

        assert!(eventually(|| async { view.get("w1").await.map(|s| s.amount) == Some(42) }).await);
    }

    #[tokio::test]
    async fn test_skips_undecodable_records() {
        let log = changelog(1).await;
        log.append("wallet-table", "bad", vec![0x0a, 0x05, b'w'])
            .await
            .unwrap();
        append_state(&log, "w1", 7).await;

        let view = WalletView::start(log, "wallet").await.unwrap();
        view.wait_recovered().await;

        assert_eq!(view.get("bad").await, None);
        assert_eq!(view.get("w1").await, Some(WalletState::new("w1", 7)));
    }

    #[tokio::test]
    async fn test_missing_changelog_topic() {
        let log = Arc::new(MemoryLog::new());
        let result = WalletView::start(log, "wallet").await;
        assert!(matches!(result, Err(LogError::UnknownTopic(_))));
    }
}
