//! Endpoint data model
//!
//! - [`EndpointDescriptor`]: raw entry returned by a provider fetch
//! - [`EndpointIdentity`]: the `(source, ip, port)` triple naming a durable record
//! - [`EndpointRecord`]: the durable record kept by a [`RecordStore`](crate::traits::RecordStore)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Raw endpoint descriptor as produced by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Proxy address
    pub ip: IpAddr,
    /// Proxy port
    pub port: u16,
    /// Remaining lifetime in seconds, as declared by the provider
    pub ttl_secs: i64,
    /// City/region label
    #[serde(default)]
    pub city: String,
    /// Network provider (ISP) label
    #[serde(default)]
    pub isp: String,
    /// Egress address observed by the upstream, if reported
    #[serde(default)]
    pub egress_ip: Option<IpAddr>,
}

impl EndpointDescriptor {
    /// Create a descriptor without labels
    pub fn new(ip: IpAddr, port: u16, ttl_secs: i64) -> Self {
        Self {
            ip,
            port,
            ttl_secs,
            city: String::new(),
            isp: String::new(),
            egress_ip: None,
        }
    }

    /// Set the city and ISP labels
    pub fn with_labels(mut self, city: impl Into<String>, isp: impl Into<String>) -> Self {
        self.city = city.into();
        self.isp = isp.into();
        self
    }

    /// Set the observed egress address
    pub fn with_egress_ip(mut self, egress_ip: IpAddr) -> Self {
        self.egress_ip = Some(egress_ip);
        self
    }

    /// `ip:port` key used by the expiry index
    pub fn host_port(&self) -> String {
        host_port(self.ip, self.port)
    }

    /// Absolute expiry computed from the TTL at `now`
    ///
    /// Fails with [`Error::InvalidInput`] when the TTL does not fit in a
    /// representable timestamp.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_seconds(self.ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "TTL of {}s for {} is out of range",
                    self.ttl_secs,
                    self.host_port()
                ))
            })
    }
}

/// Format an `ip:port` key (IPv6 addresses are bracketed)
pub fn host_port(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

/// Identity of a durable endpoint record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentity {
    /// Provider source name
    pub source: String,
    /// Proxy address
    pub ip: IpAddr,
    /// Proxy port
    pub port: u16,
}

impl EndpointIdentity {
    /// Create a new identity
    pub fn new(source: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            source: source.into(),
            ip,
            port,
        }
    }
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, host_port(self.ip, self.port))
    }
}

/// Durable endpoint record
///
/// Identity fields (`source`, `ip`, `port`) never change after creation.
/// Labels, expiry and egress address are overwritten on every ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    source: String,
    ip: IpAddr,
    port: u16,
    /// City/region label
    pub city: String,
    /// Network provider (ISP) label
    pub isp: String,
    /// Absolute expiry instant
    pub expires_at: DateTime<Utc>,
    /// Egress address observed by the upstream
    pub egress_ip: Option<IpAddr>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl EndpointRecord {
    /// Build a new record from a freshly fetched descriptor
    pub fn from_descriptor(
        source: &str,
        descriptor: &EndpointDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            ip: descriptor.ip,
            port: descriptor.port,
            city: descriptor.city.clone(),
            isp: descriptor.isp.clone(),
            expires_at: descriptor.expires_at(now)?,
            egress_ip: descriptor.egress_ip,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrite the mutable attributes from a re-ingested descriptor
    ///
    /// The record is left untouched if the new expiry is out of range.
    pub fn refresh(&mut self, descriptor: &EndpointDescriptor, now: DateTime<Utc>) -> Result<()> {
        self.expires_at = descriptor.expires_at(now)?;
        self.city = descriptor.city.clone();
        self.isp = descriptor.isp.clone();
        self.egress_ip = descriptor.egress_ip;
        self.updated_at = now;
        Ok(())
    }

    /// Identity triple of this record
    pub fn identity(&self) -> EndpointIdentity {
        EndpointIdentity::new(self.source.clone(), self.ip, self.port)
    }

    /// Provider source name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Proxy address
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Proxy port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `ip:port` key used by the expiry index
    pub fn host_port(&self) -> String {
        host_port(self.ip, self.port)
    }

    /// Expiry as epoch seconds (the expiry index score)
    pub fn expiry_score(&self) -> i64 {
        self.expires_at.timestamp()
    }
}
