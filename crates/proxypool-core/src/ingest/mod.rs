//! Ingestion pipeline
//!
//! Turns one fetched batch into durable records and expiry index entries.
//!
//! ## Flow (per descriptor)
//!
//! 1. Compute the identity `(source, ip, port)` and the absolute expiry `now + ttl`
//! 2. Look up the existing record by identity
//! 3. Create a new record, or overwrite labels and expiry of the existing one
//! 4. Upsert the record into the [`RecordStore`]
//! 5. Upsert `ip:port` into the [`ExpiryIndex`] with the expiry as score
//!
//! Descriptors are independent. A store failure on one of them is logged and
//! counted, and processing continues with the next one. The two stores are
//! written independently: a record store failure does not keep the endpoint out
//! of the expiry index, and vice versa.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::{EndpointDescriptor, EndpointIdentity, EndpointRecord};
use crate::traits::{ExpiryIndex, FetchResult, RecordStore};

/// Per-batch ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Records created for previously unknown identities
    pub created: usize,
    /// Existing records refreshed in place
    pub updated: usize,
    /// Descriptors for which at least one store write failed
    pub failed: usize,
}

impl IngestOutcome {
    /// Total number of descriptors processed
    pub fn total(&self) -> usize {
        self.created + self.updated + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Created,
    Updated,
}

/// Writes fetched batches into the record store and the expiry index
///
/// Both stores are injected; the pipeline owns no state of its own and can
/// be shared by every poll loop.
pub struct IngestionPipeline {
    records: Arc<dyn RecordStore>,
    index: Arc<dyn ExpiryIndex>,
}

impl IngestionPipeline {
    /// Create a pipeline over the given stores
    pub fn new(records: Arc<dyn RecordStore>, index: Arc<dyn ExpiryIndex>) -> Self {
        Self { records, index }
    }

    /// Ingest a whole fetch result
    ///
    /// A failed fetch is returned unchanged for the caller to log; nothing is
    /// written and nothing is retried.
    pub async fn ingest_fetch(&self, source: &str, result: FetchResult) -> Result<IngestOutcome> {
        let batch = result?;
        Ok(self.ingest(source, &batch).await)
    }

    /// Ingest a batch, computing expiries from the current time
    pub async fn ingest(&self, source: &str, batch: &[EndpointDescriptor]) -> IngestOutcome {
        self.ingest_at(source, batch, Utc::now()).await
    }

    /// Ingest a batch, computing expiries relative to `now`
    pub async fn ingest_at(
        &self,
        source: &str,
        batch: &[EndpointDescriptor],
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        for descriptor in batch {
            match self.ingest_one(source, descriptor, now).await {
                Ok(Disposition::Created) => outcome.created += 1,
                Ok(Disposition::Updated) => outcome.updated += 1,
                Err(_) => outcome.failed += 1,
            }
        }

        if !batch.is_empty() {
            debug!(
                source,
                created = outcome.created,
                updated = outcome.updated,
                failed = outcome.failed,
                "Batch ingested"
            );
        }

        outcome
    }

    async fn ingest_one(
        &self,
        source: &str,
        descriptor: &EndpointDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        let identity = EndpointIdentity::new(source, descriptor.ip, descriptor.port);
        let host_port = descriptor.host_port();

        // Neither store is touched for a descriptor whose expiry can't be represented
        let score = match descriptor.expires_at(now) {
            Ok(expires_at) => expires_at.timestamp(),
            Err(e) => {
                error!(
                    source,
                    identity = %identity,
                    ttl_secs = descriptor.ttl_secs,
                    error = %e,
                    "Rejected endpoint with unusable TTL"
                );
                return Err(e);
            }
        };

        let record_result = self.save_record(&identity, descriptor, now).await;
        if let Err(e) = &record_result {
            error!(
                source,
                identity = %identity,
                store = "record_store",
                error = %e,
                "Failed to persist endpoint record"
            );
        }

        let index_result = self.index.upsert(&host_port, score).await;
        if let Err(e) = &index_result {
            error!(
                source,
                host_port = %host_port,
                score,
                store = "expiry_index",
                error = %e,
                "Failed to update expiry index"
            );
        }

        let disposition = record_result?;
        index_result?;
        Ok(disposition)
    }

    async fn save_record(
        &self,
        identity: &EndpointIdentity,
        descriptor: &EndpointDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        let existing = self
            .records
            .find_by_identity(identity)
            .await
            .map_err(|e| persistence(e, "lookup"))?;

        let (record, disposition) = match existing {
            Some(mut record) => {
                record.refresh(descriptor, now)?;
                (record, Disposition::Updated)
            }
            None => (
                EndpointRecord::from_descriptor(&identity.source, descriptor, now)?,
                Disposition::Created,
            ),
        };

        self.records
            .upsert(&record)
            .await
            .map_err(|e| persistence(e, "upsert"))?;

        Ok(disposition)
    }
}

fn persistence(err: Error, operation: &str) -> Error {
    match err {
        Error::Persistence { .. } => err,
        other => Error::persistence("record_store", format!("{} failed: {}", operation, other)),
    }
}
