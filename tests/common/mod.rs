//! Shared utilities for integration tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use walletstream::bus::MemoryLog;
use walletstream::storage::Stores;
use walletstream::{Engine, EngineHandle};

/// Poll `check` until it holds, sleeping 10ms between attempts.
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

/// Start an engine on the given in-memory log and stores.
pub async fn start_engine(
    log: Arc<MemoryLog>,
    stores: Stores,
    window: Duration,
) -> EngineHandle {
    let handle = Engine::builder()
        .with_memory_log(log)
        .with_stores(stores)
        .with_partitions(4)
        .with_decay_window(window)
        .build()
        .await
        .expect("engine should build")
        .start()
        .await
        .expect("engine should start");
    handle.service().wait_ready().await;
    handle
}
