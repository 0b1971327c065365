//! Wallet engine step definitions.

use std::time::Duration;

use cucumber::{given, then, when, World};
use walletstream::service::ServiceError;
use walletstream::{Engine, EngineHandle, WalletSnapshot};

/// How long `eventually` steps keep polling.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Test context for wallet scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct WalletWorld {
    engine: Option<EngineHandle>,
    window: Duration,
    last_snapshot: Option<WalletSnapshot>,
    last_error: Option<String>,
    last_rejection: Option<Rejection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    EmptyKey,
    InvalidAmount,
}

impl WalletWorld {
    fn new() -> Self {
        Self {
            engine: None,
            window: Duration::ZERO,
            last_snapshot: None,
            last_error: None,
            last_rejection: None,
        }
    }

    fn engine(&self) -> &EngineHandle {
        self.engine.as_ref().expect("Engine not started")
    }

    async fn wait_for(&self, expected: &WalletSnapshot) -> WalletSnapshot {
        let service = self.engine().service();
        let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
        loop {
            let snapshot = service.query_state(&expected.wallet_id).await;
            if &snapshot == expected || tokio::time::Instant::now() >= deadline {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn expected(wallet_id: String, amount: u64, above: bool) -> WalletSnapshot {
    WalletSnapshot {
        wallet_id,
        amount,
        above_threshold: above,
    }
}

// --- Background ---

#[given(expr = "a running wallet engine with a decay window of {int} milliseconds")]
async fn given_running_engine(world: &mut WalletWorld, window_ms: u64) {
    world.window = Duration::from_millis(window_ms);
    let handle = Engine::builder()
        .with_partitions(4)
        .with_decay_window(world.window)
        .build()
        .await
        .expect("engine should build")
        .start()
        .await
        .expect("engine should start");
    handle.service().wait_ready().await;
    world.engine = Some(handle);
}

// --- When steps ---

#[when(expr = "I deposit {int} into wallet {string}")]
async fn when_deposit(world: &mut WalletWorld, amount: u64, wallet_id: String) {
    match world.engine().service().deposit(&wallet_id, amount).await {
        Ok(_) => {
            world.last_error = None;
            world.last_rejection = None;
        }
        Err(e) => {
            world.last_rejection = match e {
                ServiceError::EmptyKey => Some(Rejection::EmptyKey),
                ServiceError::InvalidAmount { .. } => Some(Rejection::InvalidAmount),
                _ => None,
            };
            world.last_error = Some(e.to_string());
        }
    }
}

#[when(expr = "I query wallet {string}")]
async fn when_query(world: &mut WalletWorld, wallet_id: String) {
    let snapshot = world.engine().service().query_state(&wallet_id).await;
    world.last_snapshot = Some(snapshot);
}

#[when("the decay window elapses")]
async fn when_window_elapses(world: &mut WalletWorld) {
    tokio::time::sleep(world.window + Duration::from_millis(100)).await;
}

// --- Then steps ---

#[then(expr = "the wallet {string} has amount {int} and is not above threshold")]
async fn then_queried_not_above(world: &mut WalletWorld, wallet_id: String, amount: u64) {
    let snapshot = world.last_snapshot.as_ref().expect("No query was made");
    assert_eq!(snapshot, &expected(wallet_id, amount, false));
}

#[then(expr = "eventually wallet {string} has amount {int} and is above threshold")]
async fn then_eventually_above(world: &mut WalletWorld, wallet_id: String, amount: u64) {
    let want = expected(wallet_id, amount, true);
    let got = world.wait_for(&want).await;
    assert_eq!(got, want);
}

#[then(expr = "eventually wallet {string} has amount {int} and is not above threshold")]
async fn then_eventually_not_above(world: &mut WalletWorld, wallet_id: String, amount: u64) {
    let want = expected(wallet_id, amount, false);
    let got = world.wait_for(&want).await;
    assert_eq!(got, want);
}

#[then("the deposit is rejected as an invalid amount")]
async fn then_rejected_invalid_amount(world: &mut WalletWorld) {
    assert_eq!(
        world.last_rejection,
        Some(Rejection::InvalidAmount),
        "last error: {:?}",
        world.last_error
    );
}

#[then("the deposit is rejected for a missing wallet id")]
async fn then_rejected_empty_key(world: &mut WalletWorld) {
    assert_eq!(
        world.last_rejection,
        Some(Rejection::EmptyKey),
        "last error: {:?}",
        world.last_error
    );
}
