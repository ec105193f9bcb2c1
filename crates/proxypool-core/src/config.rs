//! Configuration types for the proxy pool
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for every interval, margin and grace period (100 years)
///
/// Larger values overflow timer deadlines and expiry arithmetic.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn check_duration_secs(name: &str, secs: u64) -> Result<(), crate::Error> {
    if secs > MAX_DURATION_SECS {
        return Err(crate::Error::config(format!(
            "{} must be <= {} seconds, got {}",
            name, MAX_DURATION_SECS, secs
        )));
    }
    Ok(())
}

/// Main proxy pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Providers to poll, one poll loop each
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Durable record store configuration
    #[serde(default)]
    pub record_store: RecordStoreConfig,

    /// Sweep settings
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Poll loop settings shared by all providers
    #[serde(default)]
    pub poll: PollConfig,
}

impl PoolConfig {
    /// Validate the settings that every loop depends on
    ///
    /// Per-provider settings are validated separately by
    /// [`ProviderConfig::validate`] so that one bad provider does not keep
    /// the others from starting.
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.sweep.validate()?;
        self.poll.validate()?;
        self.record_store.validate()?;
        Ok(())
    }
}

/// Upstream provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Zhima-style JSON API
    Zhima {
        /// Source name recorded on every endpoint (defaults to "zhima")
        #[serde(default = "default_zhima_source")]
        source: String,
        /// Fetch URL; `{count}` is replaced with `batch_size`
        fetch_url: String,
        /// Number of endpoints requested per fetch
        #[serde(default = "default_batch_size")]
        batch_size: u32,
        /// Seconds between fetches
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        /// Whitelist binding URL; `{ip}` is replaced with the egress address
        #[serde(default)]
        bind_url: Option<String>,
        /// Service returning the local egress address as plain text
        #[serde(default)]
        egress_ip_url: Option<String>,
    },

    /// Provider supplied by an externally registered factory
    Custom {
        /// Factory name to use
        factory: String,
        /// Seconds between fetches
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        /// Custom configuration data
        #[serde(default)]
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Create a custom provider entry with no settings
    ///
    /// Used for provider names that have no built-in configuration shape.
    pub fn custom(factory: impl Into<String>) -> Self {
        ProviderConfig::Custom {
            factory: factory.into(),
            poll_interval_secs: default_poll_interval_secs(),
            config: serde_json::Value::Null,
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Zhima {
                source,
                fetch_url,
                batch_size,
                poll_interval_secs,
                ..
            } => {
                if source.is_empty() {
                    return Err(crate::Error::config("Zhima source name cannot be empty"));
                }
                if fetch_url.is_empty() {
                    return Err(crate::Error::config("Zhima fetch_url cannot be empty"));
                }
                if *batch_size == 0 {
                    return Err(crate::Error::config("Zhima batch_size must be > 0"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("Zhima poll_interval_secs must be > 0"));
                }
                check_duration_secs("Zhima poll_interval_secs", *poll_interval_secs)
            }
            ProviderConfig::Custom {
                factory,
                poll_interval_secs,
                ..
            } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom provider factory cannot be empty"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config(format!(
                        "Provider {} poll_interval_secs must be > 0",
                        factory
                    )));
                }
                check_duration_secs(
                    &format!("Provider {} poll_interval_secs", factory),
                    *poll_interval_secs,
                )
            }
        }
    }

    /// Get the provider type name (the registry key)
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Zhima { .. } => "zhima",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }

    /// Configured poll interval
    pub fn poll_interval(&self) -> Duration {
        match self {
            ProviderConfig::Zhima {
                poll_interval_secs, ..
            }
            | ProviderConfig::Custom {
                poll_interval_secs, ..
            } => Duration::from_secs(*poll_interval_secs),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStoreConfig {
    /// JSON file store
    File {
        /// Path to the record file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl RecordStoreConfig {
    /// Validate the record store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RecordStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Record store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,

    /// Lead time before expiry at which entries are retired
    ///
    /// Every sweep removes entries scored at or before `now + safety_margin_secs`,
    /// so endpoints leave the index before they actually expire.
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
}

impl SweepConfig {
    /// Validate the sweep configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Sweep interval_secs must be > 0"));
        }
        check_duration_secs("Sweep interval_secs", self.interval_secs)?;
        check_duration_secs("Sweep safety_margin_secs", self.safety_margin_secs)
    }

    /// Interval between sweeps
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            safety_margin_secs: default_safety_margin_secs(),
        }
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between whitelist re-binding calls
    #[serde(default = "default_whitelist_interval_secs")]
    pub whitelist_interval_secs: u64,

    /// Delay between the initial bind and the first fetch (milliseconds)
    #[serde(default = "default_startup_grace_millis")]
    pub startup_grace_millis: u64,

    /// Capacity of the pool event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl PollConfig {
    /// Validate the poll configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.whitelist_interval_secs == 0 {
            return Err(crate::Error::config("Whitelist interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        check_duration_secs("Whitelist interval", self.whitelist_interval_secs)?;
        check_duration_secs("Startup grace", self.startup_grace_millis / 1000)
    }

    /// Interval between whitelist re-binding calls
    pub fn whitelist_interval(&self) -> Duration {
        Duration::from_secs(self.whitelist_interval_secs)
    }

    /// Delay between the initial bind and the first fetch
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_millis)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            whitelist_interval_secs: default_whitelist_interval_secs(),
            startup_grace_millis: default_startup_grace_millis(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_zhima_source() -> String {
    "zhima".to_string()
}

fn default_batch_size() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_safety_margin_secs() -> u64 {
    60
}

fn default_whitelist_interval_secs() -> u64 {
    60
}

fn default_startup_grace_millis() -> u64 {
    1000
}

fn default_event_channel_capacity() -> usize {
    1000
}
