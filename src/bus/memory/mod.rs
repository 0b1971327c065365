//! In-memory partitioned log for standalone mode.
//!
//! Topics live in process memory; consumers of a partition are woken through
//! a `Notify` whenever a record is appended. Nothing survives a restart.
//! Ideal for local development and testing without external dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use super::{
    partition_for, EventLog, LogError, Position, Record, RecordStream, Result, TopicManager,
};

/// One ordered sub-log.
#[derive(Default)]
struct Partition {
    records: RwLock<Vec<Record>>,
    appended: Notify,
}

impl Partition {
    async fn get(&self, offset: u64) -> Option<Record> {
        self.records.read().await.get(offset as usize).cloned()
    }
}

struct Topic {
    partitions: Vec<Arc<Partition>>,
}

/// In-memory event log.
///
/// Also acts as its own topic manager.
#[derive(Default)]
pub struct MemoryLog {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    fail_on_append: RwLock<bool>,
}

impl MemoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail with a connection error.
    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// All records of a partition, for inspection.
    pub async fn records(&self, topic: &str, partition: u32) -> Result<Vec<Record>> {
        let partition = self.partition(topic, partition).await?;
        let records = partition.records.read().await;
        Ok(records.clone())
    }

    async fn topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LogError::UnknownTopic(name.to_string()))
    }

    async fn partition(&self, topic: &str, partition: u32) -> Result<Arc<Partition>> {
        self.topic(topic)
            .await?
            .partitions
            .get(partition as usize)
            .cloned()
            .ok_or_else(|| LogError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    #[tracing::instrument(name = "log.append", skip_all, fields(topic = %topic, key = %key))]
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Position> {
        if *self.fail_on_append.read().await {
            return Err(LogError::Connection("Memory log unavailable".to_string()));
        }

        let handle = self.topic(topic).await?;
        let partition = partition_for(key, handle.partitions.len() as u32);
        let sub_log = &handle.partitions[partition as usize];

        let offset = {
            let mut records = sub_log.records.write().await;
            let offset = records.len() as u64;
            records.push(Record {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.to_string(),
                payload,
                timestamp: Utc::now(),
            });
            offset
        };
        sub_log.appended.notify_waiters();

        debug!(partition, offset, "Appended record");

        Ok(Position { partition, offset })
    }

    async fn partitions(&self, topic: &str) -> Result<u32> {
        Ok(self.topic(topic).await?.partitions.len() as u32)
    }

    async fn high_watermark(&self, topic: &str, partition: u32) -> Result<u64> {
        let partition = self.partition(topic, partition).await?;
        let len = partition.records.read().await.len();
        Ok(len as u64)
    }

    async fn consume(&self, topic: &str, partition: u32, from: u64) -> Result<RecordStream> {
        let sub_log = self.partition(topic, partition).await?;

        let stream = futures::stream::unfold((sub_log, from), |(sub_log, offset)| async move {
            loop {
                // Register interest before looking so an append in between is not missed.
                let appended = sub_log.appended.notified();
                if let Some(record) = sub_log.get(offset).await {
                    drop(appended);
                    let item: Result<Record> = Ok(record);
                    return Some((item, (sub_log, offset + 1)));
                }
                appended.await;
            }
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl TopicManager for MemoryLog {
    async fn ensure_topic(&self, name: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(LogError::InvalidPartitions(name.to_string()));
        }

        let mut topics = self.topics.write().await;
        match topics.get(name) {
            Some(existing) => {
                if existing.partitions.len() as u32 != partitions {
                    warn!(
                        topic = %name,
                        existing = existing.partitions.len(),
                        requested = partitions,
                        "Topic exists with a different partition count, keeping existing"
                    );
                }
            }
            None => {
                let topic = Topic {
                    partitions: (0..partitions)
                        .map(|_| Arc::new(Partition::default()))
                        .collect(),
                };
                topics.insert(name.to_string(), Arc::new(topic));
                info!(topic = %name, partitions, "Created topic");
            }
        }

        Ok(())
    }
}
