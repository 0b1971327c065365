//! walletstream: wallet stream-processing engine
//!
//! Runs both processors, both views and the decay scheduler until
//! interrupted.
//!
//! ## Configuration
//! - `--config <path>` or WALLETSTREAM_CONFIG: YAML config file (optional)
//! - WALLETSTREAM__SECTION__FIELD: override any config field
//! - WALLETSTREAM_LOG: log filter (default: info)

use std::time::Duration;

use tracing::{info, warn};

use walletstream::config::Config;
use walletstream::utils::bootstrap::{init_tracing, shutdown_signal};
use walletstream::Engine;

const READY_TIMEOUT: Duration = Duration::from_secs(60);

fn config_path_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = config_path_arg();
    let config = Config::load(path.as_deref())?;

    let handle = Engine::from_config(&config).await?.start().await?;

    match tokio::time::timeout(READY_TIMEOUT, handle.service().wait_ready()).await {
        Ok(()) => info!("walletstream ready"),
        Err(_) => warn!(timeout = ?READY_TIMEOUT, "Views still replaying, serving stale reads"),
    }

    shutdown_signal().await;
    info!(
        pending_compensations = handle.scheduler().pending(),
        "Shutting down"
    );
    handle.shutdown();

    Ok(())
}
