// # Built-in Stores
//
// Record store and expiry index implementations shipped with the core.

pub mod expiry;
pub mod file;
pub mod memory;

pub use expiry::MemoryExpiryIndex;
pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use std::sync::Arc;

use crate::config::RecordStoreConfig;
use crate::error::Result;
use crate::traits::RecordStore;

/// Open the record store described by the configuration
pub async fn open_record_store(config: &RecordStoreConfig) -> Result<Arc<dyn RecordStore>> {
    config.validate()?;
    match config {
        RecordStoreConfig::Memory => Ok(Arc::new(MemoryRecordStore::new())),
        RecordStoreConfig::File { path } => Ok(Arc::new(FileRecordStore::new(path).await?)),
    }
}
