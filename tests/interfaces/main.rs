//! Interface tests for the deposit/query contract using Cucumber.
//!
//! Runs against the in-memory log and stores with real (shortened) timers:
//!
//! ```bash
//! cargo test --test interfaces
//! ```

mod steps;

use cucumber::World;
use steps::wallet::WalletWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Wallet Interface Tests ===\n");
    WalletWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/wallet.feature")
        .await;
}
