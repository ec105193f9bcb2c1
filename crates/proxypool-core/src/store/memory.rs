// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Fast record store without persistence across restarts. Useful for tests,
// embedded usage, and deployments where the expiry index is the only thing
// consumers read.
//
// ## Crash Behavior
//
// - All records are lost on restart/crash
// - The next ingestion of an endpoint creates its record again

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{EndpointIdentity, EndpointRecord};
use crate::traits::RecordStore;

/// In-memory record store implementation
///
/// Records are kept in a HashMap keyed by identity, protected by a RwLock.
/// Cloning the store shares the underlying map.
///
/// # Example
///
/// ```rust,no_run
/// use proxypool_core::store::MemoryRecordStore;
/// use proxypool_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     assert!(store.list().await?.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<HashMap<EndpointIdentity, EndpointRecord>>>,
}

impl MemoryRecordStore {
    /// Create a new empty memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_identity(
        &self,
        identity: &EndpointIdentity,
    ) -> Result<Option<EndpointRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(identity).cloned())
    }

    async fn upsert(&self, record: &EndpointRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(record.identity(), record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EndpointRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
