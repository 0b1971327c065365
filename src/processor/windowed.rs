use async_trait::async_trait;
use tracing::warn;

use crate::codec::{DeltaCodec, WalletCodec, WalletState};
use crate::emitter::Emitter;
use crate::scheduler::{compensation_id, DecayScheduler};

use super::{Commit, EffectError, Fold, FoldError};

/// Net positive activity inside the decay window.
///
/// A positive delta is forwarded to the balance topic and schedules its own
/// compensation; negative deltas are those compensations coming back.
pub struct WindowedFold {
    forward: Emitter,
    scheduler: DecayScheduler,
}

impl WindowedFold {
    /// `forward` writes to the balance topic.
    pub fn new(forward: Emitter, scheduler: DecayScheduler) -> Self {
        Self { forward, scheduler }
    }
}

#[async_trait]
impl Fold for WindowedFold {
    type EventCodec = DeltaCodec;
    type StateCodec = WalletCodec;

    fn initial(&self, key: &str) -> WalletState {
        WalletState::new(key, 0)
    }

    fn apply(&self, key: &str, state: WalletState, delta: &i64) -> Result<WalletState, FoldError> {
        let next = i128::from(state.amount) + i128::from(*delta);

        if next < 0 {
            // Only reachable when a compensation was delivered twice.
            warn!(
                key,
                amount = state.amount,
                delta = *delta,
                "Windowed amount below zero, clamping"
            );
            return Ok(WalletState::new(key, 0));
        }

        let amount = u64::try_from(next).map_err(|_| FoldError::Overflow {
            key: key.to_string(),
            amount: state.amount,
            delta: *delta,
        })?;

        Ok(WalletState::new(key, amount))
    }

    async fn after_commit(&self, commit: &Commit<'_, Self>) -> Result<(), EffectError> {
        let delta = *commit.event;
        if delta <= 0 {
            return Ok(());
        }

        let record = commit.record;
        let forwarded = self
            .forward
            .emit(&record.key, record.payload.clone())
            .await;

        // The compensation is scheduled even if forwarding failed so the
        // window still decays.
        let id = compensation_id(record);
        let scheduled = self.scheduler.schedule(id, &record.key, delta).await;

        forwarded?;
        scheduled?;
        Ok(())
    }
}
