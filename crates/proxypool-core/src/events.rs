//! Events emitted by poll loops and the sweep loop
//!
//! Events travel over a bounded channel. When the channel is full the event is
//! dropped with a warning; emitting never blocks a loop.

use tokio::sync::mpsc;
use tracing::warn;

use crate::ingest::IngestOutcome;

/// Observable pool activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A poll loop entered `Running`
    PollerStarted { source: String },

    /// A poll loop exited
    PollerStopped { source: String },

    /// Whitelist binding succeeded
    BindSucceeded { source: String },

    /// Whitelist binding failed
    BindFailed { source: String, error: String },

    /// A fetched batch was ingested
    FetchSucceeded { source: String, outcome: IngestOutcome },

    /// A fetch failed; nothing was ingested
    FetchFailed { source: String, error: String },

    /// A sweep removed `removed` entries
    SweepCompleted { removed: usize, max_score: i64 },

    /// A sweep could not delete from the index
    SweepFailed { error: String },
}

/// Cloneable handle used by loops to emit [`PoolEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PoolEvent>>,
}

impl EventSink {
    /// Create a bounded sink and the receiver for its events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PoolEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event without waiting
    pub fn emit(&self, event: PoolEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event channel full, dropping event {:?}. Consider increasing event_channel_capacity.",
                    event
                );
            }
            // Nobody is listening anymore
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_event() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(PoolEvent::SweepCompleted {
            removed: 1,
            max_score: 10,
        });
        sink.emit(PoolEvent::SweepCompleted {
            removed: 2,
            max_score: 20,
        });

        assert_eq!(
            rx.recv().await,
            Some(PoolEvent::SweepCompleted {
                removed: 1,
                max_score: 10
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        EventSink::disabled().emit(PoolEvent::SweepFailed {
            error: "ignored".to_string(),
        });
    }
}
