//! Engine assembly.
//!
//! Wires the log, the stores, both processors, both views and the decay
//! scheduler together. Everything is constructed here once and passed
//! down explicitly.
//!
//! # Example
//!
//! ```ignore
//! let handle = Engine::builder()
//!     .with_decay_window(Duration::from_secs(30))
//!     .build()
//!     .await?
//!     .start()
//!     .await?;
//!
//! handle.service().deposit("w1", 5000).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::bus::{init_event_log, table_topic, EventLog, LogError, MemoryLog, TopicManager};
use crate::config::{Config, ConfigError, EmitterConfig};
use crate::emitter::Emitter;
use crate::processor::{BalanceFold, Processor, ProcessorError, ProcessorHandle, WindowedFold};
use crate::scheduler::{DecayScheduler, SchedulerError};
use crate::service::WalletService;
use crate::storage::{init_storage, StorageError, Stores};
use crate::view::WalletView;

/// Result type for engine assembly.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that prevent the engine from starting.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),
}

/// Builder for an `Engine`.
///
/// Backends not set explicitly are created from the configuration when
/// `build` runs.
pub struct EngineBuilder {
    config: Config,
    decay_window: Option<Duration>,
    event_log: Option<(Arc<dyn EventLog>, Arc<dyn TopicManager>)>,
    stores: Option<Stores>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Defaults: in-memory log, in-memory stores, 120s window, threshold 10000.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            decay_window: None,
            event_log: None,
            stores: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_topics(mut self, balance: impl Into<String>, windowed: impl Into<String>) -> Self {
        self.config.topics.balance = balance.into();
        self.config.topics.windowed = windowed.into();
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.config.topics.partitions = partitions;
        self
    }

    /// Decay window with sub-second precision; overrides `decay.window_secs`.
    pub fn with_decay_window(mut self, window: Duration) -> Self {
        self.decay_window = Some(window);
        self
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.config.decay.threshold = threshold;
        self
    }

    pub fn with_emitter(mut self, emitter: EmitterConfig) -> Self {
        self.config.emitter = emitter;
        self
    }

    /// Use an existing log and topic manager.
    pub fn with_event_log(
        mut self,
        event_log: Arc<dyn EventLog>,
        topics: Arc<dyn TopicManager>,
    ) -> Self {
        self.event_log = Some((event_log, topics));
        self
    }

    /// Use an existing in-memory log, e.g. to inspect it in tests.
    pub fn with_memory_log(self, log: Arc<MemoryLog>) -> Self {
        let event_log: Arc<dyn EventLog> = log.clone();
        let topics: Arc<dyn TopicManager> = log;
        self.with_event_log(event_log, topics)
    }

    /// Use existing stores.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Validate the configuration and create missing backends.
    pub async fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let (log, topics) = match self.event_log {
            Some(backend) => backend,
            None => init_event_log(&self.config.messaging).await?,
        };
        let stores = match self.stores {
            Some(stores) => stores,
            None => init_storage(&self.config.storage).await?,
        };
        let window = self
            .decay_window
            .unwrap_or_else(|| self.config.decay.window());

        Ok(Engine {
            config: self.config,
            window,
            log,
            topics,
            stores,
        })
    }
}

/// Assembled, not yet running engine.
pub struct Engine {
    config: Config,
    window: Duration,
    log: Arc<dyn EventLog>,
    topics: Arc<dyn TopicManager>,
    stores: Stores,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Build an engine with the backends named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        EngineBuilder::new().with_config(config.clone()).build().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decay_window(&self) -> Duration {
        self.window
    }

    /// Provision topics, recover compensations and spawn all tasks.
    ///
    /// On failure every task spawned so far is stopped, recovered timers
    /// included.
    pub async fn start(self) -> Result<EngineHandle> {
        self.provision_topics().await;

        let scheduler = DecayScheduler::new(
            Emitter::new(self.log.clone(), &self.config.topics.windowed, &self.config.emitter),
            self.stores.compensations.clone(),
            self.window,
        );
        scheduler.recover().await?;

        let (processors, service) = match self.spawn(&scheduler).await {
            Ok(running) => running,
            Err(e) => {
                scheduler.shutdown();
                return Err(e);
            }
        };

        let topics = &self.config.topics;
        info!(
            balance_topic = %topics.balance,
            windowed_topic = %topics.windowed,
            partitions = topics.partitions,
            window = ?self.window,
            threshold = self.config.decay.threshold,
            "Engine started"
        );

        Ok(EngineHandle {
            service,
            scheduler,
            processors,
        })
    }

    /// Start both processors and both views. Handles dropped on error abort
    /// their workers.
    async fn spawn(
        &self,
        scheduler: &DecayScheduler,
    ) -> Result<(Vec<ProcessorHandle>, WalletService)> {
        let topics = &self.config.topics;
        let emitter_config = &self.config.emitter;

        let balance = Processor::new(
            &topics.balance,
            &topics.balance,
            BalanceFold,
            self.log.clone(),
            &self.stores,
            emitter_config,
        )
        .start()
        .await?;

        let windowed = Processor::new(
            &topics.windowed,
            &topics.windowed,
            WindowedFold::new(
                Emitter::new(self.log.clone(), &topics.balance, emitter_config),
                scheduler.clone(),
            ),
            self.log.clone(),
            &self.stores,
            emitter_config,
        )
        .start()
        .await?;

        let balances = Arc::new(WalletView::start(self.log.clone(), &topics.balance).await?);
        let windowed_view = Arc::new(WalletView::start(self.log.clone(), &topics.windowed).await?);

        let service = WalletService::new(
            Emitter::new(self.log.clone(), &topics.windowed, emitter_config),
            balances,
            windowed_view,
            self.config.decay.threshold,
        );

        Ok((vec![balance, windowed], service))
    }

    /// Create input and changelog topics. Failures are logged, not fatal:
    /// the topic may already exist from a previous run.
    async fn provision_topics(&self) {
        let topics = &self.config.topics;
        let names = [
            topics.balance.clone(),
            topics.windowed.clone(),
            table_topic(&topics.balance),
            table_topic(&topics.windowed),
        ];

        for name in &names {
            if let Err(e) = self.topics.ensure_topic(name, topics.partitions).await {
                warn!(topic = %name, error = %e, "Topic provisioning failed, continuing");
            }
        }
    }
}

/// A running engine.
///
/// Dropping the handle stops the processors.
pub struct EngineHandle {
    service: WalletService,
    scheduler: DecayScheduler,
    processors: Vec<ProcessorHandle>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("service", &self.service)
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl EngineHandle {
    pub fn service(&self) -> &WalletService {
        &self.service
    }

    pub fn scheduler(&self) -> &DecayScheduler {
        &self.scheduler
    }

    /// Partition workers still running across both processors.
    pub fn running_workers(&self) -> usize {
        self.processors.iter().map(ProcessorHandle::running).sum()
    }

    /// Stop all processor workers and disarm pending compensations.
    pub fn shutdown(&self) {
        for processor in &self.processors {
            processor.abort();
        }
        self.scheduler.shutdown();
        info!("Engine stopped");
    }
}
