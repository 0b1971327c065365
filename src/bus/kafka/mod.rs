//! Kafka event log implementation.
//!
//! Topics map one to one onto Kafka topics. Keys are the wallet id, so the
//! Kafka partitioner (murmur2, same as `partition_for`) keeps per-key order.
//! Consumers use explicit partition assignment starting at an offset owned
//! by the caller; auto-commit is off because offsets live in `OffsetStore`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::{
    EventLog, KafkaConfig, LogError, Position, Record, RecordStream, Result, TopicManager,
};

/// Timeout for produce acknowledgements and metadata requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered records between the consumer task and the stream reader.
const CONSUMER_BUFFER: usize = 256;

/// librdkafka settings shared by the producer, admin and consumer clients.
fn client_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &kafka.bootstrap_servers);

    let optional = [
        ("security.protocol", &kafka.security_protocol),
        ("sasl.mechanism", &kafka.sasl_mechanism),
        ("sasl.username", &kafka.sasl_username),
        ("sasl.password", &kafka.sasl_password),
        ("ssl.ca.location", &kafka.ssl_ca_location),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            config.set(name, value);
        }
    }
    config
}

/// Producer side: every append waits for all in-sync replicas.
fn producer_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = client_config(kafka);
    config
        .set("message.timeout.ms", REQUEST_TIMEOUT.as_millis().to_string())
        .set("acks", "all")
        .set("enable.idempotence", "true")
        // Java-compatible hashing so partition_for agrees with the producer.
        .set("partitioner", "murmur2_random");
    config
}

/// Reader of one partition. Offsets are owned by the caller, never committed here.
fn consumer_config(kafka: &KafkaConfig, topic: &str, partition: u32) -> ClientConfig {
    let mut config = client_config(kafka);
    config
        .set("group.id", format!("walletstream-{}-{}", topic, partition))
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest");
    config
}

/// Kafka-backed event log.
pub struct KafkaLog {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    config: KafkaConfig,
}

impl KafkaLog {
    /// Create producer and admin clients. Connections are established lazily.
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = producer_config(&config)
            .create()
            .map_err(|e| LogError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        let admin: AdminClient<DefaultClientContext> = client_config(&config)
            .create()
            .map_err(|e| LogError::Connection(format!("Failed to create Kafka admin: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self {
            producer,
            admin,
            config,
        })
    }
}

#[async_trait]
impl EventLog for KafkaLog {
    #[tracing::instrument(name = "log.append", skip_all, fields(topic = %topic, key = %key))]
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Position> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, REQUEST_TIMEOUT)
            .await
            .map_err(|(e, _)| LogError::Append(format!("Failed to publish: {}", e)))?;

        debug!(partition, offset, "Published record to Kafka");

        Ok(Position {
            partition: partition as u32,
            offset: offset as u64,
        })
    }

    async fn partitions(&self, topic: &str) -> Result<u32> {
        let producer = self.producer.clone();
        let name = topic.to_string();

        // Metadata requests block the calling thread.
        let count = tokio::task::spawn_blocking(move || {
            let metadata = producer
                .client()
                .fetch_metadata(Some(name.as_str()), REQUEST_TIMEOUT)
                .map_err(|e| LogError::Connection(format!("Failed to fetch metadata: {}", e)))?;
            metadata
                .topics()
                .iter()
                .find(|t| t.name() == name && t.error().is_none())
                .map(|t| t.partitions().len() as u32)
                .filter(|count| *count > 0)
                .ok_or(LogError::UnknownTopic(name))
        })
        .await
        .map_err(|e| LogError::Connection(format!("Metadata task failed: {}", e)))??;

        Ok(count)
    }

    async fn high_watermark(&self, topic: &str, partition: u32) -> Result<u64> {
        let producer = self.producer.clone();
        let name = topic.to_string();

        let (_low, high) = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_watermarks(&name, partition as i32, REQUEST_TIMEOUT)
                .map_err(|e| LogError::Connection(format!("Failed to fetch watermarks: {}", e)))
        })
        .await
        .map_err(|e| LogError::Connection(format!("Watermark task failed: {}", e)))??;

        Ok(high.max(0) as u64)
    }

    async fn consume(&self, topic: &str, partition: u32, from: u64) -> Result<RecordStream> {
        let consumer: StreamConsumer = consumer_config(&self.config, topic, partition)
            .create()
            .map_err(|e| LogError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition as i32, Offset::Offset(from as i64))
            .map_err(|e| LogError::Consume(format!("Invalid assignment: {}", e)))?;
        consumer
            .assign(&assignment)
            .map_err(|e| LogError::Consume(format!("Failed to assign partition: {}", e)))?;

        info!(topic = %topic, partition, from, "Assigned Kafka partition");

        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        let topic = topic.to_string();

        // Spawn reader task
        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = consumer.stream();

            while let Some(result) = stream.next().await {
                let item = match result {
                    Ok(message) => {
                        let key = match message.key().map(std::str::from_utf8) {
                            Some(Ok(k)) => k.to_string(),
                            Some(Err(_)) | None => {
                                warn!(
                                    topic = %topic,
                                    offset = message.offset(),
                                    "Skipping record without a UTF-8 key"
                                );
                                continue;
                            }
                        };
                        let timestamp = message
                            .timestamp()
                            .to_millis()
                            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                            .unwrap_or_else(Utc::now);

                        Ok(Record {
                            topic: topic.clone(),
                            partition: message.partition() as u32,
                            offset: message.offset() as u64,
                            key,
                            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                            timestamp,
                        })
                    }
                    Err(e) => {
                        error!(topic = %topic, error = %e, "Kafka consumer error");
                        Err(LogError::Consume(e.to_string()))
                    }
                };

                if tx.send(item).await.is_err() {
                    debug!(topic = %topic, "Record stream dropped, stopping reader");
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl TopicManager for KafkaLog {
    async fn ensure_topic(&self, name: &str, partitions: u32) -> Result<()> {
        if partitions == 0 {
            return Err(LogError::InvalidPartitions(name.to_string()));
        }

        let topic = NewTopic::new(
            name,
            partitions as i32,
            TopicReplication::Fixed(self.config.replication),
        );

        let results = self
            .admin
            .create_topics(&[topic], &AdminOptions::new())
            .await
            .map_err(|e| LogError::Provision(e.to_string()))?;

        for result in results {
            match result {
                Ok(created) => info!(topic = %created, partitions, "Created topic"),
                Err((existing, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %existing, "Topic already exists");
                }
                Err((failed, code)) => {
                    return Err(LogError::Provision(format!("{}: {}", failed, code)));
                }
            }
        }

        Ok(())
    }
}
