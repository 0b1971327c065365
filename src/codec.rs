//! Payload and state encodings.
//!
//! Two formats cross the log:
//! - event payloads: a signed integer as decimal ASCII, no framing
//!   (negative values are compensations)
//! - state records: a fixed protobuf structure `{wallet_id, amount}`
//!
//! The "above threshold" flag is never part of either; it is computed at
//! query time from the windowed amount.

use prost::Message;

/// Errors produced while decoding payloads or state records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Payload is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("Payload '{payload}' is not a signed 64-bit integer: {source}")]
    InvalidDelta {
        payload: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("State record decode error: {0}")]
    State(#[from] prost::DecodeError),
}

/// Converts values to and from their log representation.
pub trait Codec: Default + Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    fn encode(&self, value: &Self::Value) -> Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, CodecError>;
}

/// Decimal ASCII signed integer payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCodec;

impl Codec for DeltaCodec {
    type Value = i64;

    fn encode(&self, value: &i64) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        text.parse().map_err(|source| CodecError::InvalidDelta {
            payload: text.to_string(),
            source,
        })
    }
}

/// Per-wallet state record stored in processor tables.
///
/// No schema evolution: changing this structure requires migrating all
/// stored tables and changelogs.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct WalletState {
    #[prost(string, tag = "1")]
    pub wallet_id: String,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
}

impl WalletState {
    pub fn new(wallet_id: impl Into<String>, amount: u64) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            amount,
        }
    }
}

/// Protobuf encoding of `WalletState`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletCodec;

impl Codec for WalletCodec {
    type Value = WalletState;

    fn encode(&self, value: &WalletState) -> Vec<u8> {
        value.encode_to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> Result<WalletState, CodecError> {
        Ok(WalletState::decode(bytes)?)
    }
}
