// # Record Store Trait
//
// Defines the durable store of known endpoints.
//
// ## Purpose
//
// Keeps exactly one EndpointRecord per (source, ip, port) identity.
// Re-ingesting an identity updates the existing record in place.
//
// ## Implementations
//
// - In-memory: `MemoryRecordStore`
// - JSON file: `FileRecordStore`
// - Relational databases plug in through this trait

use async_trait::async_trait;

use crate::model::{EndpointIdentity, EndpointRecord};

/// Trait for durable record store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple poll loops.
/// The store owns its concurrency control; the pool adds no locking of its own.
///
/// # Uniqueness
///
/// The identity triple is a uniqueness constraint: `upsert` creates the record
/// when the identity is unknown and replaces it otherwise, never duplicating.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by identity
    ///
    /// # Returns
    ///
    /// - `Ok(Some(EndpointRecord))`: The stored record
    /// - `Ok(None)`: No record with this identity
    /// - `Err(Error)`: Storage error
    async fn find_by_identity(
        &self,
        identity: &EndpointIdentity,
    ) -> Result<Option<EndpointRecord>, crate::Error>;

    /// Create or update a record
    async fn upsert(&self, record: &EndpointRecord) -> Result<(), crate::Error>;

    /// List all stored records
    async fn list(&self) -> Result<Vec<EndpointRecord>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
