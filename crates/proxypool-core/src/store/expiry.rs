// # Memory Expiry Index
//
// In-process sorted set implementing ExpiryIndex.
//
// Members map to their score, and a `(score, member)` ordered set gives
// range access by score. Both are updated under one write lock so they never
// disagree.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::ExpiryIndex;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn upsert(&mut self, member: &str, score: i64) {
        if let Some(previous) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(previous, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn in_range(&self, min_score: i64, max_score: i64) -> impl Iterator<Item = &(i64, String)> {
        let lower = (min_score, String::new());
        self.ordered
            .range(lower..)
            .take_while(move |(score, _)| *score <= max_score)
    }
}

/// In-memory expiry index
///
/// Cloning the index shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct MemoryExpiryIndex {
    inner: Arc<RwLock<SortedSet>>,
}

impl MemoryExpiryIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiryIndex for MemoryExpiryIndex {
    async fn upsert(&self, host_port: &str, score: i64) -> Result<(), Error> {
        self.inner.write().await.upsert(host_port, score);
        Ok(())
    }

    async fn delete_range(&self, min_score: i64, max_score: i64) -> Result<usize, Error> {
        if min_score > max_score {
            return Ok(0);
        }

        let mut guard = self.inner.write().await;
        let doomed: Vec<(i64, String)> = guard.in_range(min_score, max_score).cloned().collect();
        for entry in &doomed {
            guard.ordered.remove(entry);
            guard.scores.remove(&entry.1);
        }
        Ok(doomed.len())
    }

    async fn score(&self, host_port: &str) -> Result<Option<i64>, Error> {
        Ok(self.inner.read().await.scores.get(host_port).copied())
    }

    async fn range_by_score(
        &self,
        min_score: i64,
        max_score: i64,
    ) -> Result<Vec<(String, i64)>, Error> {
        if min_score > max_score {
            return Ok(Vec::new());
        }

        let guard = self.inner.read().await;
        Ok(guard
            .in_range(min_score, max_score)
            .map(|(score, member)| (member.clone(), *score))
            .collect())
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.inner.read().await.scores.len())
    }
}
