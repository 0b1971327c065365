use crate::codec::{DeltaCodec, WalletCodec, WalletState};

use super::{Fold, FoldError};

/// Running sum of deposits.
///
/// Deposits only: the balance never decreases, so negative deltas are
/// rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalanceFold;

impl Fold for BalanceFold {
    type EventCodec = DeltaCodec;
    type StateCodec = WalletCodec;

    fn initial(&self, key: &str) -> WalletState {
        WalletState::new(key, 0)
    }

    fn apply(&self, key: &str, state: WalletState, delta: &i64) -> Result<WalletState, FoldError> {
        let delta = *delta;
        if delta < 0 {
            return Err(FoldError::NegativeDeposit {
                key: key.to_string(),
                delta,
            });
        }

        let amount = state
            .amount
            .checked_add(delta as u64)
            .ok_or_else(|| FoldError::Overflow {
                key: key.to_string(),
                amount: state.amount,
                delta,
            })?;

        Ok(WalletState::new(key, amount))
    }
}
