//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - Loops stop promptly wherever they are waiting (grace, timers, fetch)
//! - A shutdown requested before start means nothing runs
//! - A dropped shutdown sender counts as a shutdown request
//! - The pool flushes the record store exactly once, after every loop exits
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Waits that ignore the shutdown signal

mod common;

use common::*;
use proxypool_core::config::{PollConfig, PoolConfig, ProviderConfig};
use proxypool_core::traits::ProviderClient;
use proxypool_core::{
    EventSink, IngestionPipeline, MemoryExpiryIndex, MemoryRecordStore, Orchestrator, PollLoop,
    PollState, ProviderRegistry, shutdown,
};
use std::sync::Arc;
use std::time::Duration;

fn poll_loop(provider: &Arc<ScriptedProvider>, config: &PollConfig) -> PollLoop {
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryExpiryIndex::new()),
    ));
    PollLoop::new(
        Arc::clone(provider) as Arc<dyn ProviderClient>,
        pipeline,
        config,
        EventSink::disabled(),
    )
    .expect("valid poll loop")
}

#[tokio::test]
async fn shutdown_during_startup_grace() {
    let provider = Arc::new(ScriptedProvider::new("zhima", Duration::from_millis(50)));
    let config = PollConfig {
        startup_grace_millis: 10_000,
        ..fast_poll_config()
    };
    let poll_loop = poll_loop(&provider, &config);
    let state = poll_loop.state();

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = poll_loop.spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send_replace(true);

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "poll loop should not wait out the grace period");

    assert_eq!(provider.fetch_calls(), 0);
    assert_eq!(*state.borrow(), PollState::Stopped);
}

#[tokio::test]
async fn shutdown_during_in_flight_fetch() {
    let provider = Arc::new(
        ScriptedProvider::new("zhima", Duration::from_millis(50)).slow(Duration::from_secs(30)),
    );
    let poll_loop = poll_loop(&provider, &fast_poll_config());

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = poll_loop.spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(provider.fetch_calls(), 1, "fetch is in flight");

    shutdown_tx.send_replace(true);
    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "in-flight fetch should be abandoned on shutdown");
}

#[tokio::test]
async fn shutdown_before_start_runs_nothing() {
    let provider = Arc::new(ScriptedProvider::new("zhima", Duration::from_millis(50)));
    let poll_loop = poll_loop(&provider, &fast_poll_config());

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    shutdown_tx.send_replace(true);

    poll_loop.run(shutdown_rx).await;

    assert_eq!(provider.bind_calls(), 0);
    assert_eq!(provider.fetch_calls(), 0);
}

#[tokio::test]
async fn dropped_sender_stops_loops() {
    let provider = Arc::new(ScriptedProvider::new("zhima", Duration::from_secs(3600)));
    let poll_loop = poll_loop(&provider, &fast_poll_config());

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = poll_loop.spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(shutdown_tx);

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "poll loop should stop when the sender is gone");
}

#[tokio::test]
async fn pool_shutdown_stops_everything_and_flushes_once() {
    let provider = Arc::new(
        ScriptedProvider::new("zhima", Duration::from_millis(50))
            .steady(vec![descriptor("10.0.0.1", 3128, 300)]),
    );
    let registry = ProviderRegistry::new();
    registry.register_provider("scripted", Box::new(ScriptedFactory(Arc::clone(&provider))));

    let records = FailingRecordStore::healthy();
    let config = PoolConfig {
        providers: vec![ProviderConfig::custom("scripted")],
        poll: fast_poll_config(),
        ..PoolConfig::default()
    };
    let orchestrator = Orchestrator::with_stores(
        config,
        Arc::new(records.clone()),
        Arc::new(MemoryExpiryIndex::new()),
    );

    let (pool, mut events) = orchestrator.start(&registry).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = tokio::time::timeout(Duration::from_secs(5), pool.shutdown()).await;
    assert!(result.is_ok(), "pool should stop within 5 seconds");
    result.unwrap().unwrap();

    assert_eq!(records.flush_calls(), 1);

    // Every sender lives inside a loop, so the channel closes once they exit
    let closed = tokio::time::timeout(Duration::from_secs(1), async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "no loop outlived the pool");

    let fetches = provider.fetch_calls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(provider.fetch_calls(), fetches, "no fetch after shutdown");
}
