//! In-memory storage implementations.
//!
//! Used in standalone mode and tests. Contents are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CompensationStore, OffsetStore, Result, TableStore};
use crate::scheduler::Compensation;

/// Key type for offsets: (group, topic, partition).
type OffsetKey = (String, String, u32);

/// In-memory table store.
#[derive(Default)]
pub struct MemoryTableStore {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn get(&self, group: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(group.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, group: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries
            .write()
            .await
            .insert((group.to_string(), key.to_string()), value);
        Ok(())
    }
}

/// In-memory offset store.
#[derive(Default)]
pub struct MemoryOffsetStore {
    offsets: RwLock<HashMap<OffsetKey, u64>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn get(&self, group: &str, topic: &str, partition: u32) -> Result<Option<u64>> {
        let offsets = self.offsets.read().await;
        Ok(offsets
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }

    async fn put(&self, group: &str, topic: &str, partition: u32, next_offset: u64) -> Result<()> {
        self.offsets
            .write()
            .await
            .insert((group.to_string(), topic.to_string(), partition), next_offset);
        Ok(())
    }
}

/// In-memory compensation store.
#[derive(Default)]
pub struct MemoryCompensationStore {
    pending: RwLock<HashMap<String, Compensation>>,
}

impl MemoryCompensationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompensationStore for MemoryCompensationStore {
    async fn put(&self, compensation: &Compensation) -> Result<()> {
        self.pending
            .write()
            .await
            .insert(compensation.id.clone(), compensation.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.pending.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Compensation>> {
        let pending = self.pending.read().await;
        let mut all: Vec<_> = pending.values().cloned().collect();
        all.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
