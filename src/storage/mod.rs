//! Local state storage.
//!
//! Three stores back the engine:
//! - `TableStore`: per-key state of each processor group
//! - `OffsetStore`: next input offset per group/topic/partition
//! - `CompensationStore`: compensations waiting for their decay deadline
//!
//! Implementations: in-memory (lost on restart) and SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::scheduler::Compensation;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryCompensationStore, MemoryOffsetStore, MemoryTableStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteCompensationStore, SqliteOffsetStore, SqliteTableStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid timestamp '{value}' for compensation {id}")]
    InvalidTimestamp { id: String, value: String },

    #[error("Storage type '{0}' is not available in this build")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-key state of processor groups.
///
/// Only the owning processor writes a group's entries.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Encoded state for a key, `None` if the key was never written.
    async fn get(&self, group: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the encoded state for a key.
    async fn put(&self, group: &str, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Consumer positions.
///
/// Stores the offset of the next record to process, so a restarted worker
/// resumes right after the last committed record.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns `None` if the group never committed on this partition.
    async fn get(&self, group: &str, topic: &str, partition: u32) -> Result<Option<u64>>;

    /// Upserts the next offset.
    async fn put(&self, group: &str, topic: &str, partition: u32, next_offset: u64) -> Result<()>;
}

/// Pending compensations of the decay scheduler.
#[async_trait]
pub trait CompensationStore: Send + Sync {
    /// Store a compensation; an existing entry with the same id is replaced.
    async fn put(&self, compensation: &Compensation) -> Result<()>;

    /// Forget a compensation once it has fired. Unknown ids are ignored.
    async fn remove(&self, id: &str) -> Result<()>;

    /// All pending compensations, earliest deadline first.
    async fn list(&self) -> Result<Vec<Compensation>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Process memory; nothing survives a restart.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Path to the database file (sqlite).
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            path: "./data/walletstream.db".to_string(),
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// The full set of stores an engine needs.
#[derive(Clone)]
pub struct Stores {
    pub tables: Arc<dyn TableStore>,
    pub offsets: Arc<dyn OffsetStore>,
    pub compensations: Arc<dyn CompensationStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            tables: Arc::new(MemoryTableStore::new()),
            offsets: Arc::new(MemoryOffsetStore::new()),
            compensations: Arc::new(MemoryCompensationStore::new()),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Storage initialized");
            Ok(Stores::in_memory())
        }
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                if let Some(parent) = std::path::Path::new(&config.path).parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let pool =
                    sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;
                let stores = sqlite::init(pool).await?;

                info!(storage_type = "sqlite", path = %config.path, "Storage initialized");
                Ok(stores)
            }

            #[cfg(not(feature = "sqlite"))]
            {
                Err(StorageError::Unavailable("sqlite".to_string()))
            }
        }
    }
}
