//! Minimal embedding example for proxypool-core
//!
//! Runs the orchestrator inside an application with an in-process provider
//! and in-memory stores, then reads the usable endpoints back from the
//! expiry index ordered by expiry.

use proxypool_core::config::{PollConfig, PoolConfig, ProviderConfig, SweepConfig};
use proxypool_core::traits::{FetchResult, ProviderClient, ProviderClientFactory};
use proxypool_core::{
    EndpointDescriptor, MemoryExpiryIndex, MemoryRecordStore, Orchestrator, ProviderRegistry,
    Result,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Provider that hands out a new endpoint on every fetch
struct EmbeddedProvider {
    next_octet: AtomicU8,
}

#[async_trait::async_trait]
impl ProviderClient for EmbeddedProvider {
    fn source_name(&self) -> &str {
        "embedded"
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(200)
    }

    async fn fetch(&self) -> FetchResult {
        let octet = self.next_octet.fetch_add(1, Ordering::SeqCst);
        let ip = IpAddr::from([10, 0, 0, octet]);
        Ok(vec![
            EndpointDescriptor::new(ip, 3128, 120).with_labels("Local", "Embedded"),
        ])
    }

    async fn bind_allowed_caller(&self) -> Result<()> {
        println!("[Embedded] Caller bound");
        Ok(())
    }
}

struct EmbeddedFactory;

impl ProviderClientFactory for EmbeddedFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        Ok(Arc::new(EmbeddedProvider {
            next_octet: AtomicU8::new(1),
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded proxypool-core Example ===\n");

    let registry = ProviderRegistry::new();
    registry.register_provider("embedded", Box::new(EmbeddedFactory));

    let config = PoolConfig {
        providers: vec![ProviderConfig::custom("embedded")],
        sweep: SweepConfig {
            interval_secs: 60,
            safety_margin_secs: 60,
        },
        poll: PollConfig {
            startup_grace_millis: 100,
            event_channel_capacity: 100,
            ..PollConfig::default()
        },
        ..PoolConfig::default()
    };

    let index = MemoryExpiryIndex::new();
    let orchestrator = Orchestrator::with_stores(
        config,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(index.clone()),
    );

    println!("1. Starting pool...");
    let (pool, mut event_rx) = orchestrator.start(&registry)?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    // Grace period plus a few fetches
    tokio::time::sleep(Duration::from_millis(1000)).await;

    println!("\n2. Usable endpoints, soonest expiry first:");
    let records = pool.record_store().list().await?;
    for (host_port, expires_at) in pool.expiry_index().range_by_score(0, i64::MAX).await? {
        println!("   {} (expires at {})", host_port, expires_at);
    }
    println!("   {} durable record(s)", records.len());

    println!("\n3. Stopping pool...");
    pool.shutdown().await?;
    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
