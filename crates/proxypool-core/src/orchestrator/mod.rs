//! Orchestrator
//!
//! Owns the stores, starts one [`PollLoop`] per configured provider plus the
//! single [`SweepLoop`], and tears everything down on shutdown.
//!
//! ## Startup
//!
//! 1. Resolve every configured provider through the [`ProviderRegistry`]
//! 2. Spawn the sweep loop
//! 3. Spawn a poll loop for every provider that resolved
//!
//! A provider that fails to resolve (unknown name, invalid settings) is
//! reported in the [`StartupReport`] and skipped. It never keeps the sweep
//! or other providers from starting.
//!
//! ## Shutdown
//!
//! [`RunningPool::shutdown`] flips the shared shutdown signal, waits for every
//! loop to exit, then flushes the record store.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::events::{EventSink, PoolEvent};
use crate::ingest::IngestionPipeline;
use crate::poller::PollLoop;
use crate::registry::ProviderRegistry;
use crate::shutdown;
use crate::store::{self, MemoryExpiryIndex};
use crate::sweeper::SweepLoop;
use crate::traits::{ExpiryIndex, RecordStore};

/// Which providers started and which were rejected
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Source names of started poll loops
    pub started: Vec<String>,
    /// Provider type names that failed to start, with the reason
    pub failed: Vec<(String, Error)>,
}

/// Pool orchestrator
pub struct Orchestrator {
    config: PoolConfig,
    records: Arc<dyn RecordStore>,
    index: Arc<dyn ExpiryIndex>,
}

impl Orchestrator {
    /// Open the configured record store and a fresh in-memory expiry index
    pub async fn open(config: PoolConfig) -> Result<Self> {
        let records = store::open_record_store(&config.record_store).await?;
        Ok(Self::with_stores(config, records, Arc::new(MemoryExpiryIndex::new())))
    }

    /// Use already opened stores
    pub fn with_stores(
        config: PoolConfig,
        records: Arc<dyn RecordStore>,
        index: Arc<dyn ExpiryIndex>,
    ) -> Self {
        Self {
            config,
            records,
            index,
        }
    }

    /// Shared handle to the expiry index
    pub fn expiry_index(&self) -> Arc<dyn ExpiryIndex> {
        Arc::clone(&self.index)
    }

    /// Shared handle to the record store
    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    /// Start all loops
    ///
    /// # Returns
    ///
    /// - `Ok((RunningPool, Receiver<PoolEvent>))`: the running pool and its events
    /// - `Err(Error::Config)`: pool-wide settings (sweep, poll) are invalid;
    ///   nothing was started
    pub fn start(
        self,
        registry: &ProviderRegistry,
    ) -> Result<(RunningPool, mpsc::Receiver<PoolEvent>)> {
        self.config.validate()?;

        let (events, event_rx) = EventSink::channel(self.config.poll.event_channel_capacity);
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&self.records),
            Arc::clone(&self.index),
        ));

        let mut report = StartupReport::default();
        let mut poll_loops = Vec::new();

        for provider_config in &self.config.providers {
            let name = provider_config.type_name().to_string();
            let resolved = registry.create_provider(provider_config).and_then(|provider| {
                PollLoop::new(provider, Arc::clone(&pipeline), &self.config.poll, events.clone())
            });

            match resolved {
                Ok(poll_loop) => poll_loops.push(poll_loop),
                Err(e) => {
                    error!(provider = %name, error = %e, "Provider failed to start");
                    report.failed.push((name, e));
                }
            }
        }

        let sweep_loop = SweepLoop::new(Arc::clone(&self.index), &self.config.sweep, events.clone())?;

        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let sweeper = sweep_loop.spawn(shutdown_rx.clone());

        let mut pollers = Vec::with_capacity(poll_loops.len());
        for poll_loop in poll_loops {
            let source = poll_loop.source().to_string();
            if report.started.contains(&source) {
                warn!(
                    "Two providers share source name {}; their records will merge",
                    source
                );
            }
            report.started.push(source.clone());
            pollers.push((source, poll_loop.spawn(shutdown_rx.clone())));
        }

        if pollers.is_empty() {
            warn!("No provider poll loops started; only the sweep is running");
        }
        info!(
            "Proxy pool started: {} poll loop(s), {} provider(s) rejected",
            report.started.len(),
            report.failed.len()
        );

        Ok((
            RunningPool {
                shutdown_tx,
                pollers,
                sweeper,
                records: self.records,
                index: self.index,
                report,
            },
            event_rx,
        ))
    }
}

/// Handle to a started pool
pub struct RunningPool {
    shutdown_tx: watch::Sender<bool>,
    pollers: Vec<(String, JoinHandle<()>)>,
    sweeper: JoinHandle<()>,
    records: Arc<dyn RecordStore>,
    index: Arc<dyn ExpiryIndex>,
    report: StartupReport,
}

impl RunningPool {
    /// Startup outcome per provider
    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    /// Shared handle to the expiry index
    pub fn expiry_index(&self) -> Arc<dyn ExpiryIndex> {
        Arc::clone(&self.index)
    }

    /// Shared handle to the record store
    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    /// Stop every loop, wait for them, then flush the record store
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping proxy pool");
        self.shutdown_tx.send_replace(true);

        for (source, handle) in self.pollers {
            if let Err(e) = handle.await {
                error!("Poll loop for {} ended abnormally: {}", source, e);
            }
        }
        if let Err(e) = self.sweeper.await {
            error!("Sweep loop ended abnormally: {}", e);
        }

        self.records.flush().await?;
        info!("Record store flushed, proxy pool stopped");
        Ok(())
    }
}
