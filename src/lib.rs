//! Walletstream - partitioned stream processing for wallet balances
//!
//! Folds an ordered, partitioned deposit log into durable per-wallet state
//! and derives a decaying "above threshold" signal from a trailing window.
//! A deposit drives two processors: the windowed accumulator (client facing)
//! and the balance table (fed by the accumulator). Positive contributions to
//! the window are reversed by compensating events once the decay window elapses.

pub mod bus;
pub mod codec;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod processor;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod utils;
pub mod view;

#[cfg(test)]
pub(crate) mod test_utils;

pub use engine::{Engine, EngineBuilder, EngineHandle};
pub use service::{WalletService, WalletSnapshot};
