// # Provider Client Trait
//
// Defines the interface for fetching endpoint batches from an upstream proxy
// provider.
//
// ## Implementations
//
// - Zhima-style JSON API: `proxypool-provider-zhima` crate
//
// ## Usage
//
// ```rust,ignore
// use proxypool_core::ProviderClient;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* ProviderClient implementation */;
//
//     provider.bind_allowed_caller().await?;
//     let batch = provider.fetch().await?;
//     println!("{} fetched {} endpoints", provider.source_name(), batch.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::model::EndpointDescriptor;

/// Result of a single fetch: an ordered batch of descriptors or the failure
pub type FetchResult = Result<Vec<EndpointDescriptor>, crate::Error>;

/// Trait for upstream provider implementations
///
/// One implementation per upstream source. Implementations must be usable
/// across async tasks.
///
/// # Contract
///
/// - Stateless across calls with respect to the pool. Any session or token
///   lifecycle with the upstream is the implementation's private concern.
/// - `fetch()` is safe to call repeatedly and never keeps references to
///   batches it already returned.
/// - No retries, no sleeping, no spawned tasks. A failed attempt is returned
///   as an error and the [`PollLoop`](crate::poller::PollLoop) waits for its
///   next tick.
/// - Calls are bounded by the implementation's own transport timeout.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable, non-empty source name
    ///
    /// Used as the `source` field of every record ingested from this provider
    /// and for log correlation.
    fn source_name(&self) -> &str;

    /// Time between fetch attempts
    ///
    /// Read once when the poll loop starts.
    fn poll_interval(&self) -> Duration;

    /// Perform one upstream call
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<EndpointDescriptor>)`: the batch, possibly empty
    /// - `Err(Error::Transport)`: the call could not complete
    /// - `Err(Error::UpstreamRejection)`: the upstream answered with a failure status
    async fn fetch(&self) -> FetchResult;

    /// Register the local egress identity with the upstream
    ///
    /// Best effort. A failure never stops the provider's poll loop, but the
    /// caller logs and reports it.
    async fn bind_allowed_caller(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing provider clients from configuration
pub trait ProviderClientFactory: Send + Sync {
    /// Create a ProviderClient instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider
    ///
    /// # Returns
    ///
    /// A shared ProviderClient trait object
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Arc<dyn ProviderClient>, crate::Error>;
}
