//! Per-provider poll loop
//!
//! ## Lifecycle
//!
//! ```text
//! Starting ──bind + grace──▶ Running ──shutdown──▶ Stopped
//! ```
//!
//! On start the loop binds the caller with the upstream once, waits the
//! startup grace period, then drives two independent timers:
//!
//! - **fetch timer** (`ProviderClient::poll_interval`): fetch and ingest
//! - **whitelist timer** (60 s by default): bind the caller again
//!
//! Failures are logged and reported as events; the loop keeps running and
//! the next tick is the only retry. The shutdown signal is observed during the
//! grace period, at every timer wait and while a fetch is in flight.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::config::{MAX_DURATION_SECS, PollConfig};
use crate::error::{Error, Result};
use crate::events::{EventSink, PoolEvent};
use crate::ingest::IngestionPipeline;
use crate::shutdown;
use crate::traits::ProviderClient;

/// Poll loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Binding with the upstream and waiting out the startup grace period
    Starting,
    /// Timers are running
    Running,
    /// The loop has exited
    Stopped,
}

/// Poll loop for a single provider
pub struct PollLoop {
    provider: Arc<dyn ProviderClient>,
    pipeline: Arc<IngestionPipeline>,
    whitelist_interval: Duration,
    startup_grace: Duration,
    events: EventSink,
    state_tx: watch::Sender<PollState>,
}

impl PollLoop {
    /// Create a poll loop for `provider`
    ///
    /// Fails with a configuration error if the provider's poll interval or
    /// the whitelist interval is zero or too large to schedule.
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        pipeline: Arc<IngestionPipeline>,
        config: &PollConfig,
        events: EventSink,
    ) -> Result<Self> {
        if provider.source_name().is_empty() {
            return Err(Error::config("Provider source name cannot be empty"));
        }
        if provider.poll_interval().is_zero() {
            return Err(Error::config(format!(
                "Provider {} has a zero poll interval",
                provider.source_name()
            )));
        }
        if provider.poll_interval() > Duration::from_secs(MAX_DURATION_SECS) {
            return Err(Error::config(format!(
                "Provider {} poll interval {:?} exceeds {} seconds",
                provider.source_name(),
                provider.poll_interval(),
                MAX_DURATION_SECS
            )));
        }
        config.validate()?;

        let (state_tx, _) = watch::channel(PollState::Starting);

        Ok(Self {
            provider,
            pipeline,
            whitelist_interval: config.whitelist_interval(),
            startup_grace: config.startup_grace(),
            events,
            state_tx,
        })
    }

    /// Source name of the polled provider
    pub fn source(&self) -> &str {
        self.provider.source_name()
    }

    /// Subscribe to state transitions
    pub fn state(&self) -> watch::Receiver<PollState> {
        self.state_tx.subscribe()
    }

    /// Run the loop on its own task
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    /// Run the loop until shutdown is requested
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let source = self.provider.source_name().to_string();
        let fetch_interval = self.provider.poll_interval();
        self.state_tx.send_replace(PollState::Starting);

        if shutdown::is_requested(&shutdown_rx) {
            self.stop(&source);
            return;
        }

        self.bind(&source).await;

        tokio::select! {
            _ = tokio::time::sleep(self.startup_grace) => {}
            _ = shutdown::requested(&mut shutdown_rx) => {
                self.stop(&source);
                return;
            }
        }

        self.state_tx.send_replace(PollState::Running);
        self.events.emit(PoolEvent::PollerStarted {
            source: source.clone(),
        });
        info!(
            "Poll loop running (source={}, fetch_interval={:?}, whitelist_interval={:?})",
            source, fetch_interval, self.whitelist_interval
        );

        let start = Instant::now();
        let mut fetch_timer = interval_at(start + fetch_interval, fetch_interval);
        fetch_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut whitelist_timer =
            interval_at(start + self.whitelist_interval, self.whitelist_interval);
        whitelist_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = fetch_timer.tick() => {
                    let result = tokio::select! {
                        result = self.provider.fetch() => result,
                        _ = shutdown::requested(&mut shutdown_rx) => {
                            debug!("Shutdown requested during fetch (source={})", source);
                            break;
                        }
                    };
                    self.handle_fetch(&source, result).await;
                }

                _ = whitelist_timer.tick() => {
                    self.bind(&source).await;
                }

                _ = shutdown::requested(&mut shutdown_rx) => {
                    break;
                }
            }
        }

        self.stop(&source);
    }

    async fn handle_fetch(&self, source: &str, result: crate::traits::FetchResult) {
        match self.pipeline.ingest_fetch(source, result).await {
            Ok(outcome) => {
                if outcome.failed > 0 {
                    warn!(
                        "Batch from {} partially persisted: {} created, {} updated, {} failed",
                        source, outcome.created, outcome.updated, outcome.failed
                    );
                } else {
                    info!(
                        "Batch from {} ingested: {} created, {} updated",
                        source, outcome.created, outcome.updated
                    );
                }
                self.events.emit(PoolEvent::FetchSucceeded {
                    source: source.to_string(),
                    outcome,
                });
            }
            Err(e) => {
                error!(source, error = %e, "Request and save of proxy batch failed");
                self.events.emit(PoolEvent::FetchFailed {
                    source: source.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn bind(&self, source: &str) {
        match self.provider.bind_allowed_caller().await {
            Ok(()) => {
                debug!("Whitelist binding refreshed (source={})", source);
                self.events.emit(PoolEvent::BindSucceeded {
                    source: source.to_string(),
                });
            }
            Err(e) => {
                warn!(source, error = %e, "Whitelist binding failed");
                self.events.emit(PoolEvent::BindFailed {
                    source: source.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn stop(&self, source: &str) {
        self.state_tx.send_replace(PollState::Stopped);
        self.events.emit(PoolEvent::PollerStopped {
            source: source.to_string(),
        });
        info!("Poll loop stopped (source={})", source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointDescriptor;
    use crate::store::{MemoryExpiryIndex, MemoryRecordStore};
    use crate::traits::FetchResult;

    struct FixedIntervalProvider(Duration);

    #[async_trait::async_trait]
    impl ProviderClient for FixedIntervalProvider {
        fn source_name(&self) -> &str {
            "fixed"
        }

        fn poll_interval(&self) -> Duration {
            self.0
        }

        async fn fetch(&self) -> FetchResult {
            Ok(vec![EndpointDescriptor::new("1.1.1.1".parse().unwrap(), 1, 1)])
        }

        async fn bind_allowed_caller(&self) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline() -> Arc<IngestionPipeline> {
        Arc::new(IngestionPipeline::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryExpiryIndex::new()),
        ))
    }

    #[test]
    fn test_zero_poll_interval_is_config_error() {
        let result = PollLoop::new(
            Arc::new(FixedIntervalProvider(Duration::ZERO)),
            pipeline(),
            &PollConfig::default(),
            EventSink::disabled(),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unschedulable_intervals_are_config_errors() {
        let result = PollLoop::new(
            Arc::new(FixedIntervalProvider(Duration::MAX)),
            pipeline(),
            &PollConfig::default(),
            EventSink::disabled(),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let config = PollConfig {
            whitelist_interval_secs: u64::MAX,
            ..PollConfig::default()
        };
        let result = PollLoop::new(
            Arc::new(FixedIntervalProvider(Duration::from_secs(10))),
            pipeline(),
            &config,
            EventSink::disabled(),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let config = PollConfig {
            startup_grace_millis: u64::MAX,
            ..PollConfig::default()
        };
        let result = PollLoop::new(
            Arc::new(FixedIntervalProvider(Duration::from_secs(10))),
            pipeline(),
            &config,
            EventSink::disabled(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
