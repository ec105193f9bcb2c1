//! Contract Test: Orchestrator Failure Isolation
//!
//! Constraints verified:
//! - A provider that fails to resolve is reported and skipped
//! - The sweep and the other providers run regardless
//! - One provider failing every fetch does not affect another
//! - Invalid pool-wide settings start nothing
//! - File-backed records survive a restart

mod common;

use chrono::Utc;
use common::*;
use proxypool_core::config::{PoolConfig, ProviderConfig, RecordStoreConfig, SweepConfig};
use proxypool_core::traits::{ExpiryIndex, RecordStore};
use proxypool_core::{
    Error, FileRecordStore, MemoryExpiryIndex, MemoryRecordStore, Orchestrator, ProviderRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn register(registry: &ProviderRegistry, name: &str, provider: &Arc<ScriptedProvider>) {
    registry.register_provider(name, Box::new(ScriptedFactory(Arc::clone(provider))));
}

fn pool_config(providers: Vec<ProviderConfig>) -> PoolConfig {
    PoolConfig {
        providers,
        poll: fast_poll_config(),
        ..PoolConfig::default()
    }
}

#[tokio::test]
async fn unknown_provider_is_isolated() {
    let provider = Arc::new(
        ScriptedProvider::new("healthy", Duration::from_millis(50))
            .steady(vec![descriptor("10.0.0.1", 3128, 600)]),
    );
    let registry = ProviderRegistry::new();
    register(&registry, "scripted", &provider);

    let index = MemoryExpiryIndex::new();
    index
        .upsert("192.0.2.1:80", Utc::now().timestamp() - 10)
        .await
        .unwrap();

    let orchestrator = Orchestrator::with_stores(
        pool_config(vec![
            ProviderConfig::custom("missing"),
            ProviderConfig::custom("scripted"),
        ]),
        Arc::new(MemoryRecordStore::new()),
        Arc::new(index.clone()),
    );

    let (pool, _events) = assert_ok!(orchestrator.start(&registry));

    let report = pool.report();
    assert_eq!(report.started, vec!["healthy".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "missing");
    assert!(matches!(report.failed[0].1, Error::Config(_)));

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(provider.fetch_calls() >= 1, "healthy provider kept polling");
    assert_eq!(index.score("192.0.2.1:80").await.unwrap(), None, "sweep ran");
    assert!(index.score("10.0.0.1:3128").await.unwrap().is_some());

    assert_ok!(pool.shutdown().await);
}

#[tokio::test]
async fn invalid_provider_settings_are_isolated() {
    let provider = Arc::new(ScriptedProvider::new("healthy", Duration::from_millis(50)));
    let registry = ProviderRegistry::new();
    register(&registry, "scripted", &provider);
    register(&registry, "broken", &provider);

    let orchestrator = Orchestrator::with_stores(
        pool_config(vec![
            ProviderConfig::Custom {
                factory: "broken".to_string(),
                poll_interval_secs: 0,
                config: serde_json::Value::Null,
            },
            ProviderConfig::custom("scripted"),
        ]),
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryExpiryIndex::new()),
    );

    let (pool, _events) = assert_ok!(orchestrator.start(&registry));
    assert_eq!(pool.report().started.len(), 1);
    assert_eq!(pool.report().failed[0].0, "broken");

    assert_ok!(pool.shutdown().await);
}

#[tokio::test]
async fn failing_provider_does_not_affect_another() {
    let failing = Arc::new(
        ScriptedProvider::new("failing", Duration::from_millis(50))
            .failing_bind()
            .then(Err(Error::transport("failing", "timeout")))
            .then(Err(Error::transport("failing", "timeout")))
            .then(Err(Error::transport("failing", "timeout"))),
    );
    let healthy = Arc::new(
        ScriptedProvider::new("healthy", Duration::from_millis(50))
            .steady(vec![descriptor("10.0.0.1", 3128, 600)]),
    );

    let registry = ProviderRegistry::new();
    register(&registry, "failing", &failing);
    register(&registry, "healthy", &healthy);

    let records = FailingRecordStore::healthy();
    let orchestrator = Orchestrator::with_stores(
        pool_config(vec![
            ProviderConfig::custom("failing"),
            ProviderConfig::custom("healthy"),
        ]),
        Arc::new(records.clone()),
        Arc::new(MemoryExpiryIndex::new()),
    );

    let (pool, _events) = assert_ok!(orchestrator.start(&registry));
    tokio::time::sleep(Duration::from_millis(230)).await;

    assert!(failing.fetch_calls() >= 3);
    assert!(healthy.fetch_calls() >= 3);

    let stored = assert_ok!(records.list().await);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].source(), "healthy");

    assert_ok!(pool.shutdown().await);
}

#[tokio::test]
async fn invalid_sweep_settings_start_nothing() {
    let provider = Arc::new(ScriptedProvider::new("healthy", Duration::from_millis(50)));
    let registry = ProviderRegistry::new();
    register(&registry, "scripted", &provider);

    let config = PoolConfig {
        sweep: SweepConfig {
            interval_secs: 0,
            safety_margin_secs: 60,
        },
        ..pool_config(vec![ProviderConfig::custom("scripted")])
    };
    let orchestrator = Orchestrator::with_stores(
        config,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryExpiryIndex::new()),
    );

    let result = orchestrator.start(&registry);
    assert!(matches!(result, Err(Error::Config(_))));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.bind_calls(), 0);
}

#[tokio::test]
async fn file_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");

    let provider = Arc::new(
        ScriptedProvider::new("healthy", Duration::from_millis(50))
            .steady(vec![descriptor("10.0.0.1", 3128, 600).with_labels("Xuzhou", "Telecom")]),
    );
    let registry = ProviderRegistry::new();
    register(&registry, "scripted", &provider);

    let config = PoolConfig {
        record_store: RecordStoreConfig::File {
            path: path.to_string_lossy().into_owned(),
        },
        ..pool_config(vec![ProviderConfig::custom("scripted")])
    };

    let orchestrator = assert_ok!(Orchestrator::open(config).await);
    let (pool, _events) = assert_ok!(orchestrator.start(&registry));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_ok!(pool.shutdown().await);

    let reopened = assert_ok!(FileRecordStore::new(&path).await);
    let stored = assert_ok!(reopened.list().await);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].city, "Xuzhou");
}

#[tokio::test]
async fn empty_record_store_path_is_rejected() {
    let config = PoolConfig {
        record_store: RecordStoreConfig::File {
            path: String::new(),
        },
        ..PoolConfig::default()
    };
    assert_err!(config.validate());
}
