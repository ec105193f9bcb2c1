// # File Record Store
//
// JSON file implementation of RecordStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: keeps `.backup` of the last known good file
// - Corruption detection: JSON validation on load
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": [
//     {
//       "source": "zhima",
//       "ip": "1.2.3.4",
//       "port": 8080,
//       "city": "Hangzhou",
//       "isp": "Telecom",
//       "expires_at": "2025-01-09T12:00:00Z",
//       "egress_ip": null,
//       "created_at": "2025-01-09T11:58:00Z",
//       "updated_at": "2025-01-09T11:58:00Z"
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::model::{EndpointIdentity, EndpointRecord};
use crate::traits::RecordStore;

/// Record file format version
const RECORD_FILE_VERSION: &str = "1.0";

const STORE_NAME: &str = "record_store";

/// File-backed record store
///
/// Every upsert is written through to disk before it returns. A record only
/// becomes visible to readers once that write has succeeded.
///
/// # Example
///
/// ```rust,no_run
/// use proxypool_core::store::FileRecordStore;
/// use proxypool_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::new("/var/lib/proxypool/records.json").await?;
///     println!("{} known endpoints", store.list().await?.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    records: Arc<RwLock<HashMap<EndpointIdentity, EndpointRecord>>>,
    /// Serializes upserts: stage, write, rename, commit
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RecordFileFormat {
    version: String,
    records: Vec<EndpointRecord>,
}

impl FileRecordStore {
    /// Create or load a file record store
    ///
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. If it is corrupted, load the backup instead
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create record store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let records = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            records: Arc::new(RwLock::new(records)),
            write_lock: Mutex::new(()),
        })
    }

    async fn load_with_recovery(
        path: &Path,
    ) -> Result<HashMap<EndpointIdentity, EndpointRecord>, Error> {
        match Self::load(path).await {
            Ok(records) => {
                tracing::debug!("Loaded record file: {} records", records.len());
                Ok(records)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Record file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty record store.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(records) => {
                        tracing::info!("Recovered record store from backup: {} records", records.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore record file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(records)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty record store.",
                            backup_err
                        );
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<EndpointIdentity, EndpointRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Record file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(
                STORE_NAME,
                format!("Failed to read record file {}: {}", path.display(), e),
            )
        })?;

        let file: RecordFileFormat = serde_json::from_str(&content)?;

        if file.version != RECORD_FILE_VERSION {
            tracing::warn!(
                "Record file version mismatch: expected {}, got {}. Attempting to load anyway.",
                RECORD_FILE_VERSION,
                file.version
            );
        }

        Ok(file
            .records
            .into_iter()
            .map(|record| (record.identity(), record))
            .collect())
    }

    /// Write `records` to disk; the caller holds `write_lock`
    async fn persist(&self, records: &HashMap<EndpointIdentity, EndpointRecord>) -> Result<(), Error> {
        let json = {
            let mut records: Vec<&EndpointRecord> = records.values().collect();
            records.sort_by(|a, b| {
                (a.source(), a.ip(), a.port()).cmp(&(b.source(), b.ip(), b.port()))
            });
            let file = RecordFileFormat {
                version: RECORD_FILE_VERSION.to_string(),
                records: records.into_iter().cloned().collect(),
            };
            serde_json::to_string_pretty(&file).map_err(|e| {
                Error::persistence(STORE_NAME, format!("Failed to serialize records: {}", e))
            })?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(
                    STORE_NAME,
                    format!("Failed to create temp file {}: {}", temp_path.display(), e),
                )
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(
                    STORE_NAME,
                    format!("Failed to write temp file {}: {}", temp_path.display(), e),
                )
            })?;

            file.flush().await.map_err(|e| {
                Error::persistence(
                    STORE_NAME,
                    format!("Failed to flush temp file {}: {}", temp_path.display(), e),
                )
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create record backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(
                STORE_NAME,
                format!(
                    "Failed to rename {} to {}: {}",
                    temp_path.display(),
                    self.path.display(),
                    e
                ),
            )
        })?;

        tracing::trace!("Records written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn find_by_identity(
        &self,
        identity: &EndpointIdentity,
    ) -> Result<Option<EndpointRecord>, Error> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn upsert(&self, record: &EndpointRecord) -> Result<(), Error> {
        let _write_guard = self.write_lock.lock().await;

        let mut staged = self.records.read().await.clone();
        staged.insert(record.identity(), record.clone());

        // Readers keep the previous map until the file holds the new one
        self.persist(&staged).await?;
        *self.records.write().await = staged;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EndpointRecord>, Error> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every committed upsert is already on disk
        Ok(())
    }
}
