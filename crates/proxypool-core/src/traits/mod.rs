//! Core traits for the proxy pool
//!
//! This module defines the collaborator interfaces the pool depends on.
//!
//! - [`ProviderClient`]: Fetch endpoint batches from an upstream provider
//! - [`RecordStore`]: Durable upsert-by-identity store of known endpoints
//! - [`ExpiryIndex`]: Volatile score-ordered index of offered endpoints

pub mod provider_client;
pub mod record_store;
pub mod expiry_index;

pub use provider_client::{FetchResult, ProviderClient, ProviderClientFactory};
pub use record_store::RecordStore;
pub use expiry_index::ExpiryIndex;
