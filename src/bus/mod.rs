//! Partitioned event log.
//!
//! This module contains:
//! - `EventLog` trait: append to and consume from partitioned topics
//! - `TopicManager` trait: idempotent topic provisioning
//! - Messaging configuration types
//! - Implementations: in-memory, Kafka

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::info;

// Implementation modules
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
mod partitioner;

// Re-exports
#[cfg(feature = "kafka")]
pub use kafka::KafkaLog;
pub use memory::MemoryLog;
pub use partitioner::{murmur2, partition_for};

// ============================================================================
// Traits
// ============================================================================

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Topic '{topic}' has no partition {partition}")]
    UnknownPartition { topic: String, partition: u32 },

    #[error("Topic '{0}' needs at least one partition")]
    InvalidPartitions(String),

    #[error("Append failed: {0}")]
    Append(String),

    #[error("Consume failed: {0}")]
    Consume(String),

    #[error("Provisioning failed: {0}")]
    Provision(String),
}

/// A keyed entry in one partition of a topic.
///
/// Records are immutable once appended. Ordering only holds between records
/// of the same partition, and a key always maps to the same partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Where an appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub partition: u32,
    pub offset: u64,
}

/// Unbounded, ordered stream of one partition's records.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Append-only, partitioned transport.
///
/// Implementations:
/// - `MemoryLog`: in-process log for standalone mode and tests
/// - `KafkaLog`: Apache Kafka via librdkafka
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a record and wait until the log acknowledges it as durable.
    ///
    /// The partition is derived from the key, so every record for one key
    /// lands in the same ordered sub-log.
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Position>;

    /// Number of partitions of a topic.
    async fn partitions(&self, topic: &str) -> Result<u32>;

    /// Offset the next record appended to this partition will receive.
    async fn high_watermark(&self, topic: &str, partition: u32) -> Result<u64>;

    /// Stream a partition's records in log order, starting at `from`.
    ///
    /// The stream waits for new records once it has caught up and never ends
    /// on its own.
    async fn consume(&self, topic: &str, partition: u32, from: u64) -> Result<RecordStream>;
}

/// Idempotent topic provisioning.
#[async_trait]
pub trait TopicManager: Send + Sync {
    /// Create `name` with `partitions` partitions unless it already exists.
    ///
    /// An existing topic is not an error, whatever its partition count.
    async fn ensure_topic(&self, name: &str, partitions: u32) -> Result<()>;
}

/// Name of the changelog topic backing a processor group's table.
pub fn table_topic(group: &str) -> String {
    format!("{}-table", group)
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process log.
    #[default]
    Memory,
    /// Kafka log.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Replication factor for provisioned topics.
    pub replication: i32,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            replication: 1,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// A log together with the topic manager that provisions it.
pub type LogBackend = (Arc<dyn EventLog>, Arc<dyn TopicManager>);

/// Initialize the event log based on configuration.
///
/// Kafka requires the `kafka` feature.
pub async fn init_event_log(config: &MessagingConfig) -> Result<LogBackend> {
    match config.messaging_type {
        MessagingType::Memory => {
            let log = Arc::new(MemoryLog::new());
            let event_log: Arc<dyn EventLog> = log.clone();
            let topics: Arc<dyn TopicManager> = log;
            info!(messaging_type = "memory", "Event log initialized");
            Ok((event_log, topics))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let log = Arc::new(KafkaLog::new(config.kafka.clone())?);
                let event_log: Arc<dyn EventLog> = log.clone();
                let topics: Arc<dyn TopicManager> = log;
                info!(messaging_type = "kafka", "Event log initialized");
                Ok((event_log, topics))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err(LogError::Connection(
                    "Kafka support requires the 'kafka' feature. Rebuild with --features kafka"
                        .to_string(),
                ))
            }
        }
    }
}
