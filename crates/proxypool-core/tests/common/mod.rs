//! Test doubles and common utilities for contract tests
//!
//! Providers and stores here are scripted or deliberately broken so that
//! the tests can drive the loops through failure paths.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proxypool_core::config::{PollConfig, ProviderConfig};
use proxypool_core::traits::{
    ExpiryIndex, FetchResult, ProviderClient, ProviderClientFactory, RecordStore,
};
use proxypool_core::{
    EndpointDescriptor, EndpointIdentity, EndpointRecord, Error, MemoryRecordStore, PoolEvent,
    Result,
};
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shorthand for a descriptor without labels
pub fn descriptor(ip: &str, port: u16, ttl_secs: i64) -> EndpointDescriptor {
    let ip: IpAddr = ip.parse().unwrap();
    EndpointDescriptor::new(ip, port, ttl_secs)
}

/// Poll settings with no startup grace and a small event channel
pub fn fast_poll_config() -> PollConfig {
    PollConfig {
        whitelist_interval_secs: 60,
        startup_grace_millis: 0,
        event_channel_capacity: 256,
    }
}

/// Drain every event currently queued on `rx`
pub fn drain_events(rx: &mut mpsc::Receiver<PoolEvent>) -> Vec<PoolEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A ProviderClient that replays queued fetch results
///
/// Once the queue is empty, every fetch returns `steady_batch`.
pub struct ScriptedProvider {
    source: String,
    interval: Duration,
    script: Mutex<VecDeque<FetchResult>>,
    steady_batch: Vec<EndpointDescriptor>,
    fetch_delay: Duration,
    bind_fails: bool,
    fetch_calls: AtomicUsize,
    bind_calls: AtomicUsize,
    last_fetch_at: Mutex<Option<DateTime<Utc>>>,
}

impl ScriptedProvider {
    pub fn new(source: &str, interval: Duration) -> Self {
        Self {
            source: source.to_string(),
            interval,
            script: Mutex::new(VecDeque::new()),
            steady_batch: Vec::new(),
            fetch_delay: Duration::ZERO,
            bind_fails: false,
            fetch_calls: AtomicUsize::new(0),
            bind_calls: AtomicUsize::new(0),
            last_fetch_at: Mutex::new(None),
        }
    }

    /// Queue one fetch result
    pub fn then(self, result: FetchResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    /// Batch returned once the script runs out
    pub fn steady(mut self, batch: Vec<EndpointDescriptor>) -> Self {
        self.steady_batch = batch;
        self
    }

    /// Make every fetch take `delay`
    pub fn slow(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Make every whitelist binding fail
    pub fn failing_bind(mut self) -> Self {
        self.bind_fails = true;
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    /// When the most recent fetch started
    pub fn last_fetch_at(&self) -> Option<DateTime<Utc>> {
        *self.last_fetch_at.lock().unwrap()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self) -> FetchResult {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fetch_at.lock().unwrap() = Some(Utc::now());

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.steady_batch.clone()))
    }

    async fn bind_allowed_caller(&self) -> Result<()> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        if self.bind_fails {
            return Err(Error::upstream_rejection(&self.source, "whitelist full"));
        }
        Ok(())
    }
}

/// Factory handing out one shared ScriptedProvider
pub struct ScriptedFactory(pub Arc<ScriptedProvider>);

impl ProviderClientFactory for ScriptedFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        Ok(Arc::clone(&self.0) as Arc<dyn ProviderClient>)
    }
}

/// A RecordStore that fails selected upserts and counts flushes
///
/// Upsert calls are numbered from 1.
#[derive(Clone)]
pub struct FailingRecordStore {
    inner: MemoryRecordStore,
    fail_on: Arc<HashSet<usize>>,
    upsert_calls: Arc<AtomicUsize>,
    flush_calls: Arc<AtomicUsize>,
}

impl FailingRecordStore {
    pub fn new(fail_on: &[usize]) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            fail_on: Arc::new(fail_on.iter().copied().collect()),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
            flush_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store that never fails
    pub fn healthy() -> Self {
        Self::new(&[])
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn find_by_identity(&self, identity: &EndpointIdentity) -> Result<Option<EndpointRecord>> {
        self.inner.find_by_identity(identity).await
    }

    async fn upsert(&self, record: &EndpointRecord) -> Result<()> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(Error::persistence("record_store", "disk full"));
        }
        self.inner.upsert(record).await
    }

    async fn list(&self) -> Result<Vec<EndpointRecord>> {
        self.inner.list().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.flush().await
    }
}

/// An ExpiryIndex whose every call fails, like an unreachable cache server
#[derive(Default)]
pub struct UnreachableExpiryIndex {
    delete_calls: AtomicUsize,
}

impl UnreachableExpiryIndex {
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn unreachable() -> Error {
        Error::persistence("expiry_index", "connection refused")
    }
}

#[async_trait]
impl ExpiryIndex for UnreachableExpiryIndex {
    async fn upsert(&self, _host_port: &str, _score: i64) -> Result<()> {
        Err(Self::unreachable())
    }

    async fn delete_range(&self, _min_score: i64, _max_score: i64) -> Result<usize> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Err(Self::unreachable())
    }

    async fn score(&self, _host_port: &str) -> Result<Option<i64>> {
        Err(Self::unreachable())
    }

    async fn range_by_score(&self, _min_score: i64, _max_score: i64) -> Result<Vec<(String, i64)>> {
        Err(Self::unreachable())
    }

    async fn len(&self) -> Result<usize> {
        Err(Self::unreachable())
    }
}
