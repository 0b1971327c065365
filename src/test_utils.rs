//! Test utilities and mock implementations.
//!
//! Mocks wrap the in-memory stores and add failure toggles so tests can
//! exercise error paths without a real database.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{MemoryTableStore, Result as StorageResult, StorageError, TableStore};

/// Poll `check` until it holds, sleeping 10ms between attempts.
///
/// Gives up after 500 attempts. Works under paused time, where each sleep
/// auto-advances the clock.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Table store that can be told to fail reads or writes.
#[derive(Default)]
pub struct MockTableStore {
    inner: MemoryTableStore,
    fail_on_get: RwLock<bool>,
    fail_on_put: RwLock<bool>,
}

impl MockTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_put(&self, fail: bool) {
        *self.fail_on_put.write().await = fail;
    }
}

fn simulated_failure() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "simulated storage failure",
    ))
}

#[async_trait]
impl TableStore for MockTableStore {
    async fn get(&self, group: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if *self.fail_on_get.read().await {
            return Err(simulated_failure());
        }
        self.inner.get(group, key).await
    }

    async fn put(&self, group: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        if *self.fail_on_put.read().await {
            return Err(simulated_failure());
        }
        self.inner.put(group, key, value).await
    }
}
