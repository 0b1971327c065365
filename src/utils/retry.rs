//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::bus::LogError;
use crate::config::EmitterConfig;

/// Backoff for appends to the log, as configured.
pub fn emit_backoff(config: &EmitterConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Determines if a log error is worth retrying.
///
/// Retryable:
/// - `Connection`: broker unreachable or in-process log toggled off
/// - `Append`: the write was not acknowledged
///
/// Everything else (unknown topics, bad partition counts) will fail the
/// same way on every attempt.
pub fn is_retryable_log_error(error: &LogError) -> bool {
    matches!(error, LogError::Connection(_) | LogError::Append(_))
}
