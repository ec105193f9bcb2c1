//! Cooperative shutdown signal shared by all loops
//!
//! The signal is a `watch` channel carrying `true` once shutdown has been
//! requested. A dropped sender counts as a shutdown request too, so loops
//! never outlive their owner.

use tokio::sync::watch;

/// Create a shutdown signal pair
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Whether shutdown has already been requested
pub fn is_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolve once shutdown is requested
///
/// Cancel-safe: meant to be used as a `tokio::select!` branch at every
/// timer wait.
pub async fn requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
