// # proxypool-core
//
// Core library for the proxy pool ingestion and expiry system.
//
// ## Architecture Overview
//
// - **ProviderClient**: Trait for fetching endpoint batches from an upstream
// - **RecordStore**: Trait for the durable, deduplicated endpoint records
// - **ExpiryIndex**: Trait for the volatile index of offered endpoints, ordered by expiry
// - **IngestionPipeline**: Writes fetched batches into both stores
// - **PollLoop**: Per-provider fetch and whitelist timers
// - **SweepLoop**: Periodic eviction of entries about to expire
// - **Orchestrator**: Starts the loops and owns the stores
// - **ProviderRegistry**: Plugin-based registry of provider factories
//
// ## Data Flow
//
// ProviderClient → IngestionPipeline → {RecordStore, ExpiryIndex}
// SweepLoop → ExpiryIndex

pub mod traits;
pub mod model;
pub mod ingest;
pub mod poller;
pub mod sweeper;
pub mod orchestrator;
pub mod registry;
pub mod config;
pub mod error;
pub mod events;
pub mod shutdown;
pub mod store;

// Re-export core types for convenience
pub use traits::{ExpiryIndex, FetchResult, ProviderClient, ProviderClientFactory, RecordStore};
pub use model::{EndpointDescriptor, EndpointIdentity, EndpointRecord};
pub use ingest::{IngestOutcome, IngestionPipeline};
pub use poller::{PollLoop, PollState};
pub use sweeper::SweepLoop;
pub use orchestrator::{Orchestrator, RunningPool, StartupReport};
pub use registry::ProviderRegistry;
pub use config::{PollConfig, PoolConfig, ProviderConfig, RecordStoreConfig, SweepConfig};
pub use error::{Error, Result};
pub use events::{EventSink, PoolEvent};
pub use store::{FileRecordStore, MemoryExpiryIndex, MemoryRecordStore};
