// # Expiry Index Trait
//
// Defines the volatile, score-ordered index of currently offered endpoints.
//
// Members are `ip:port` strings, scores are absolute expiry instants in epoch
// seconds. The shape is that of a sorted set: upserting a member replaces its
// score, and range deletion by score is inclusive on both ends.

use async_trait::async_trait;

/// Trait for expiry index implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently. Poll loops upsert while the
/// sweep loop deletes; an upsert landing after a delete of the same member
/// simply re-creates it.
#[async_trait]
pub trait ExpiryIndex: Send + Sync {
    /// Insert a member or replace its score
    async fn upsert(&self, host_port: &str, score: i64) -> Result<(), crate::Error>;

    /// Delete every member with `min_score <= score <= max_score`
    ///
    /// # Returns
    ///
    /// The number of members removed
    async fn delete_range(&self, min_score: i64, max_score: i64) -> Result<usize, crate::Error>;

    /// Current score of a member
    async fn score(&self, host_port: &str) -> Result<Option<i64>, crate::Error>;

    /// Members with `min_score <= score <= max_score`, ordered by ascending score
    async fn range_by_score(
        &self,
        min_score: i64,
        max_score: i64,
    ) -> Result<Vec<(String, i64)>, crate::Error>;

    /// Number of members in the index
    async fn len(&self) -> Result<usize, crate::Error>;
}
