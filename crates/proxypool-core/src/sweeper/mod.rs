//! Expiry sweep loop
//!
//! A single sweep loop serves the whole pool, independent of how many
//! providers are polled. Each sweep deletes every expiry index entry scored
//! at or before `now + safety_margin`, with no lower bound, retiring
//! endpoints *before* they actually expire. The first sweep runs immediately
//! on start so the index starts clean.
//!
//! The number of removed entries is logged and emitted as an event; it never
//! changes the schedule.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info};

use crate::config::SweepConfig;
use crate::error::{Error, Result};
use crate::events::{EventSink, PoolEvent};
use crate::shutdown;
use crate::traits::ExpiryIndex;

/// Lowest score a sweep deletes from
///
/// Endpoints whose expiry lies before the epoch carry negative scores.
const SWEEP_MIN_SCORE: i64 = i64::MIN;

/// Periodic near-expiry eviction over the expiry index
pub struct SweepLoop {
    index: Arc<dyn ExpiryIndex>,
    interval: Duration,
    safety_margin: chrono::Duration,
    events: EventSink,
}

impl SweepLoop {
    /// Create a sweep loop over `index`
    pub fn new(index: Arc<dyn ExpiryIndex>, config: &SweepConfig, events: EventSink) -> Result<Self> {
        config.validate()?;
        let safety_margin = i64::try_from(config.safety_margin_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| Error::config("Sweep safety_margin_secs is out of range"))?;

        Ok(Self {
            index,
            interval: config.interval(),
            safety_margin,
            events,
        })
    }

    /// Run one sweep against the current time
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`
    ///
    /// Deletes every entry with a score `<= now + safety_margin`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(cutoff) = now.checked_add_signed(self.safety_margin) else {
            let e = Error::invalid_input(format!(
                "Sweep cutoff {} + {}s is out of range",
                now,
                self.safety_margin.num_seconds()
            ));
            error!(error = %e, "Sweep skipped");
            self.events.emit(PoolEvent::SweepFailed {
                error: e.to_string(),
            });
            return Err(e);
        };
        let max_score = cutoff.timestamp();

        match self.index.delete_range(SWEEP_MIN_SCORE, max_score).await {
            Ok(removed) => {
                info!(removed, max_score, "Cleaned expiring proxies from cache");
                self.events
                    .emit(PoolEvent::SweepCompleted { removed, max_score });
                Ok(removed)
            }
            Err(e) => {
                error!(store = "expiry_index", error = %e, max_score, "Sweep failed");
                self.events.emit(PoolEvent::SweepFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run the loop on its own task
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    /// Sweep immediately, then every `interval` until shutdown is requested
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        if shutdown::is_requested(&shutdown_rx) {
            return;
        }

        info!(
            "Sweep loop running (interval={:?}, safety_margin={}s)",
            self.interval,
            self.safety_margin.num_seconds()
        );

        // Failures are already logged and reported
        let _ = self.sweep().await;

        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let _ = self.sweep().await;
                }
                _ = shutdown::requested(&mut shutdown_rx) => {
                    break;
                }
            }
        }

        info!("Sweep loop stopped");
    }
}
