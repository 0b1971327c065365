//! Fire-and-forget writer for one topic.
//!
//! Used by clients (deposits), by processors (forwarding) and by the decay
//! scheduler (compensations). Transient append failures are retried with
//! exponential backoff before the error is handed back to the caller.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, warn};

use crate::bus::{EventLog, LogError, Position};
use crate::codec::{Codec, DeltaCodec};
use crate::config::EmitterConfig;
use crate::utils::retry::{emit_backoff, is_retryable_log_error};

/// Append to a topic failed for good.
#[derive(Debug, thiserror::Error)]
#[error("Emit to '{topic}' for key '{key}' failed: {source}")]
pub struct EmitError {
    pub topic: String,
    pub key: String,
    #[source]
    pub source: LogError,
}

/// Appends records to a single topic.
#[derive(Clone)]
pub struct Emitter {
    log: Arc<dyn EventLog>,
    topic: String,
    backoff: ExponentialBuilder,
}

impl Emitter {
    pub fn new(log: Arc<dyn EventLog>, topic: impl Into<String>, config: &EmitterConfig) -> Self {
        Self {
            log,
            topic: topic.into(),
            backoff: emit_backoff(config),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append a raw payload, retrying transient failures.
    #[tracing::instrument(name = "emitter.emit", skip_all, fields(topic = %self.topic, %key))]
    pub async fn emit(&self, key: &str, payload: Vec<u8>) -> Result<Position, EmitError> {
        let log = &self.log;
        let topic = self.topic.as_str();
        let payload = &payload;

        let position = (|| async move { log.append(topic, key, payload.clone()).await })
            .retry(self.backoff.clone())
            .when(is_retryable_log_error)
            .notify(|e: &LogError, delay: Duration| {
                warn!(error = %e, ?delay, "Append failed, retrying");
            })
            .await
            .map_err(|source| EmitError {
                topic: self.topic.clone(),
                key: key.to_string(),
                source,
            })?;

        debug!(
            partition = position.partition,
            offset = position.offset,
            "Record appended"
        );
        Ok(position)
    }

    /// Append a signed delta in the decimal payload format.
    pub async fn emit_delta(&self, key: &str, delta: i64) -> Result<Position, EmitError> {
        self.emit(key, DeltaCodec.encode(&delta)).await
    }
}
