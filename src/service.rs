//! Wallet query service.
//!
//! The boundary an outer API layer calls into: deposits go to the windowed
//! topic, queries combine the balance and windowed views.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::bus::Position;
use crate::emitter::{EmitError, Emitter};
use crate::view::WalletView;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned to callers of the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Wallet id must not be empty")]
    EmptyKey,

    #[error("Deposit amount must be between 1 and {max}, got {amount}")]
    InvalidAmount { amount: u64, max: u64 },

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Externally visible state of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSnapshot {
    pub wallet_id: String,
    pub amount: u64,
    pub above_threshold: bool,
}

impl WalletSnapshot {
    fn empty(wallet_id: &str) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            amount: 0,
            above_threshold: false,
        }
    }
}

/// Deposit and query entry points.
#[derive(Clone)]
pub struct WalletService {
    deposits: Emitter,
    balances: Arc<WalletView>,
    windowed: Arc<WalletView>,
    threshold: u64,
}

impl std::fmt::Debug for WalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletService")
            .field("deposit_topic", &self.deposits.topic())
            .field("balance_group", &self.balances.group())
            .field("windowed_group", &self.windowed.group())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl WalletService {
    /// `deposits` must write to the windowed topic.
    pub fn new(
        deposits: Emitter,
        balances: Arc<WalletView>,
        windowed: Arc<WalletView>,
        threshold: u64,
    ) -> Self {
        Self {
            deposits,
            balances,
            windowed,
            threshold,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Submit a deposit. Returns once the log has acknowledged it.
    #[tracing::instrument(name = "service.deposit", skip(self))]
    pub async fn deposit(&self, key: &str, amount: u64) -> Result<Position> {
        if key.is_empty() {
            return Err(ServiceError::EmptyKey);
        }
        let max = i64::MAX as u64;
        let delta = match i64::try_from(amount) {
            Ok(delta) if delta > 0 => delta,
            _ => return Err(ServiceError::InvalidAmount { amount, max }),
        };

        let position = self.deposits.emit_delta(key, delta).await?;
        debug!(partition = position.partition, offset = position.offset, "Deposit accepted");
        Ok(position)
    }

    /// Current state of a wallet.
    ///
    /// A wallet missing from either view reads as empty, even if the other
    /// view already knows it.
    pub async fn query_state(&self, key: &str) -> WalletSnapshot {
        let Some(balance) = self.balances.get(key).await else {
            return WalletSnapshot::empty(key);
        };
        let Some(windowed) = self.windowed.get(key).await else {
            return WalletSnapshot::empty(key);
        };

        WalletSnapshot {
            wallet_id: key.to_string(),
            amount: balance.amount,
            above_threshold: windowed.amount >= self.threshold,
        }
    }

    /// Whether both views have replayed their tables.
    pub fn is_ready(&self) -> bool {
        self.balances.is_recovered() && self.windowed.is_recovered()
    }

    /// Wait until both views have replayed their tables.
    pub async fn wait_ready(&self) {
        self.balances.wait_recovered().await;
        self.windowed.wait_recovered().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventLog, MemoryLog, TopicManager};
    use crate::codec::{Codec, WalletCodec, WalletState};
    use crate::config::EmitterConfig;
    use crate::test_utils::eventually;

    struct Fixture {
        log: Arc<MemoryLog>,
        service: WalletService,
    }

    async fn fixture() -> Fixture {
        let log = Arc::new(MemoryLog::new());
        for topic in ["threshold", "wallet-table", "threshold-table"] {
            log.ensure_topic(topic, 2).await.unwrap();
        }
        let balances = Arc::new(WalletView::start(log.clone(), "wallet").await.unwrap());
        let windowed = Arc::new(WalletView::start(log.clone(), "threshold").await.unwrap());
        let deposits = Emitter::new(log.clone(), "threshold", &EmitterConfig::default());
        let service = WalletService::new(deposits, balances, windowed, 10_000);
        service.wait_ready().await;
        Fixture { log, service }
    }

    async fn put_state(log: &MemoryLog, group: &str, key: &str, amount: u64) {
        log.append(
            &format!("{}-table", group),
            key,
            WalletCodec.encode(&WalletState::new(key, amount)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_empty() {
        let f = fixture().await;
        assert!(f.service.is_ready());
        assert_eq!(
            f.service.query_state("nobody").await,
            WalletSnapshot {
                wallet_id: "nobody".to_string(),
                amount: 0,
                above_threshold: false,
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_combines_views() {
        let f = fixture().await;
        put_state(&f.log, "wallet", "w1", 11000).await;
        put_state(&f.log, "threshold", "w1", 11000).await;

        assert!(eventually(|| async { f.service.query_state("w1").await.above_threshold }).await);
        assert_eq!(f.service.query_state("w1").await.amount, 11000);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let f = fixture().await;
        put_state(&f.log, "wallet", "w2", 10000).await;
        put_state(&f.log, "threshold", "w2", 10000).await;
        put_state(&f.log, "wallet", "w3", 9999).await;
        put_state(&f.log, "threshold", "w3", 9999).await;

        assert!(eventually(|| async { f.service.query_state("w2").await.above_threshold }).await);
        assert!(eventually(|| async { f.service.query_state("w3").await.amount == 9999 }).await);
        assert!(!f.service.query_state("w3").await.above_threshold);
    }

    #[tokio::test]
    async fn test_missing_windowed_state_discards_balance() {
        let f = fixture().await;
        put_state(&f.log, "wallet", "w1", 5000).await;

        assert!(eventually(|| async { f.service.balances.get("w1").await.is_some() }).await);
        assert_eq!(f.service.query_state("w1").await.amount, 0);
    }

    #[tokio::test]
    async fn test_deposit_validation() {
        let f = fixture().await;
        assert!(matches!(
            f.service.deposit("", 5).await,
            Err(ServiceError::EmptyKey)
        ));
        assert!(matches!(
            f.service.deposit("w1", 0).await,
            Err(ServiceError::InvalidAmount { amount: 0, .. })
        ));
        assert!(matches!(
            f.service.deposit("w1", u64::MAX).await,
            Err(ServiceError::InvalidAmount { .. })
        ));
        assert!(f.service.deposit("w1", i64::MAX as u64).await.is_ok());
    }

    #[tokio::test]
    async fn test_deposit_goes_to_windowed_topic() {
        let f = fixture().await;
        let position = f.service.deposit("w1", 5000).await.unwrap();

        let records = f.log.records("threshold", position.partition).await.unwrap();
        assert_eq!(records[position.offset as usize].payload, b"5000".to_vec());
        assert!(f.log.partitions("wallet").await.is_err());
    }

    #[test]
    fn test_snapshot_serializes_as_json() {
        let snapshot = WalletSnapshot {
            wallet_id: "w1".to_string(),
            amount: 11000,
            above_threshold: true,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"wallet_id": "w1", "amount": 11000, "above_threshold": true})
        );
    }
}
