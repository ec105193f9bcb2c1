// # Zhima Proxy Provider
//
// ProviderClient for Zhima-style proxy APIs: a GET returns a JSON document
// with a status code, a message, and the list of leased endpoints.
//
// ```json
// {
//   "code": 0,
//   "success": true,
//   "msg": "0",
//   "data": [
//     {
//       "ip": "49.68.68.197",
//       "port": 4237,
//       "expire_time": "2025-01-09 12:05:31",
//       "city": "Xuzhou",
//       "isp": "Telecom",
//       "outip": "117.88.66.12"
//     }
//   ]
// }
// ```
//
// ## Parsing Rules
//
// - A non-zero `code` is an upstream rejection carrying `msg`
// - Unknown fields are ignored
// - `expire_time` is local time in `YYYY-MM-DD HH:MM:SS`; a missing or
//   malformed value means "expires now" (TTL 0) instead of failing the batch
// - Entries with an unparsable `ip` or port are skipped with a warning
//
// ## Whitelist Binding
//
// Upstreams only serve whitelisted callers. `bind_url` is called on start and
// on every whitelist tick; if it contains `{ip}`, the local egress address is
// looked up from `egress_ip_url` first.
//
// Like every provider: one request per call, no retries, no background tasks.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use proxypool_core::config::ProviderConfig;
use proxypool_core::traits::{FetchResult, ProviderClient, ProviderClientFactory};
use proxypool_core::{EndpointDescriptor, Error, ProviderRegistry, Result};
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP timeout for upstream requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default service used to discover the local egress address
const DEFAULT_EGRESS_IP_URL: &str = "https://api.ipify.org";

/// Timestamp format of `expire_time`
const EXPIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/84.0.4147.89 Safari/537.36";

#[derive(Debug, Deserialize)]
struct IpList {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct IpItem {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    port: Value,
    #[serde(default)]
    expire_time: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    outip: Option<String>,
}

/// Zhima-style JSON provider
pub struct ZhimaProvider {
    source: String,
    /// Contains the upstream app key. Never log this value.
    fetch_url: String,
    batch_size: u32,
    poll_interval: Duration,
    bind_url: Option<String>,
    egress_ip_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ZhimaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZhimaProvider")
            .field("source", &self.source)
            .field("fetch_url", &"<REDACTED>")
            .field("batch_size", &self.batch_size)
            .field("poll_interval", &self.poll_interval)
            .field("bind_url", &self.bind_url.as_ref().map(|_| "<REDACTED>"))
            .field("egress_ip_url", &self.egress_ip_url)
            .finish()
    }
}

impl ZhimaProvider {
    /// Create a provider
    ///
    /// # Parameters
    ///
    /// - `source`: source name recorded on every endpoint
    /// - `fetch_url`: endpoint list URL; `{count}` is replaced with `batch_size`
    /// - `batch_size`: endpoints requested per fetch
    /// - `poll_interval`: time between fetches
    pub fn new(
        source: impl Into<String>,
        fetch_url: impl Into<String>,
        batch_size: u32,
        poll_interval: Duration,
    ) -> Result<Self> {
        let source = source.into();
        let fetch_url = fetch_url.into();

        if source.is_empty() {
            return Err(Error::config("Zhima source name cannot be empty"));
        }
        if fetch_url.is_empty() {
            return Err(Error::config("Zhima fetch_url cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            source,
            fetch_url,
            batch_size,
            poll_interval,
            bind_url: None,
            egress_ip_url: DEFAULT_EGRESS_IP_URL.to_string(),
            client,
        })
    }

    /// Set the whitelist binding URL
    pub fn with_bind_url(mut self, bind_url: impl Into<String>) -> Self {
        self.bind_url = Some(bind_url.into());
        self
    }

    /// Set the egress address discovery URL
    pub fn with_egress_ip_url(mut self, egress_ip_url: impl Into<String>) -> Self {
        self.egress_ip_url = egress_ip_url.into();
        self
    }

    fn request_url(&self) -> String {
        self.fetch_url
            .replace("{count}", &self.batch_size.to_string())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(&self.source, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(
                &self.source,
                format!("HTTP error: {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::transport(&self.source, format!("Failed to read response: {}", e)))
    }

    async fn egress_ip(&self) -> Result<IpAddr> {
        let text = self.get_text(&self.egress_ip_url).await?;
        let text = text.trim();
        text.parse().map_err(|_| {
            Error::transport(
                &self.source,
                format!("Egress address service returned an invalid IP: {}", text),
            )
        })
    }
}

#[async_trait]
impl ProviderClient for ZhimaProvider {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch(&self) -> FetchResult {
        let body = self.get_text(&self.request_url()).await?;
        parse_ip_list(&self.source, &body, Utc::now())
    }

    async fn bind_allowed_caller(&self) -> Result<()> {
        let Some(template) = &self.bind_url else {
            debug!("No bind_url configured for {}, skipping whitelist binding", self.source);
            return Ok(());
        };

        let url = if template.contains("{ip}") {
            let ip = self.egress_ip().await?;
            template.replace("{ip}", &ip.to_string())
        } else {
            template.clone()
        };

        let body = self.get_text(&url).await?;
        check_bind_response(&self.source, &body)
    }
}

/// Parse an endpoint list document fetched at `now`
pub fn parse_ip_list(source: &str, body: &str, now: DateTime<Utc>) -> FetchResult {
    let list: IpList = serde_json::from_str(body).map_err(|e| {
        Error::transport(source, format!("Malformed upstream response: {}", e))
    })?;

    if list.code != 0 {
        return Err(Error::upstream_rejection(source, list.msg));
    }

    let mut batch = Vec::new();
    for raw in list.data.unwrap_or_default() {
        let item: IpItem = match serde_json::from_value(raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(source, error = %e, "Skipping malformed endpoint entry");
                continue;
            }
        };

        let Ok(ip) = item.ip.trim().parse::<IpAddr>() else {
            warn!(source, ip = %item.ip, "Skipping endpoint with invalid ip");
            continue;
        };
        let Some(port) = parse_port(&item.port) else {
            warn!(source, ip = %ip, port = %item.port, "Skipping endpoint with invalid port");
            continue;
        };

        let expires_at = item
            .expire_time
            .as_deref()
            .and_then(parse_expire_time)
            .unwrap_or(now);

        let mut descriptor =
            EndpointDescriptor::new(ip, port, (expires_at - now).num_seconds()).with_labels(
                item.city.unwrap_or_default(),
                item.isp.unwrap_or_default(),
            );
        if let Some(egress_ip) = item.outip.as_deref().and_then(|s| s.trim().parse().ok()) {
            descriptor = descriptor.with_egress_ip(egress_ip);
        }
        batch.push(descriptor);
    }

    Ok(batch)
}

/// Parse `expire_time` as local time
fn parse_expire_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), EXPIRE_TIME_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn parse_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (port != 0).then_some(port)
}

/// Interpret a whitelist binding response
///
/// JSON bodies with a non-zero `code` or `"success": false` are rejections.
/// Anything else, including non-JSON bodies, counts as success since the HTTP
/// status already was.
fn check_bind_response(source: &str, body: &str) -> Result<()> {
    let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(body) else {
        return Ok(());
    };

    let message = || {
        doc.get("msg")
            .and_then(Value::as_str)
            .unwrap_or("whitelist binding rejected")
            .to_string()
    };

    if doc.get("code").and_then(Value::as_i64).is_some_and(|code| code != 0) {
        return Err(Error::upstream_rejection(source, message()));
    }
    if doc.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(Error::upstream_rejection(source, message()));
    }

    Ok(())
}

/// Factory for creating Zhima providers
pub struct ZhimaFactory;

impl ProviderClientFactory for ZhimaFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderClient>> {
        match config {
            ProviderConfig::Zhima {
                source,
                fetch_url,
                batch_size,
                poll_interval_secs,
                bind_url,
                egress_ip_url,
            } => {
                let mut provider = ZhimaProvider::new(
                    source.clone(),
                    fetch_url.clone(),
                    *batch_size,
                    Duration::from_secs(*poll_interval_secs),
                )?;
                if let Some(bind_url) = bind_url {
                    provider = provider.with_bind_url(bind_url.clone());
                }
                if let Some(egress_ip_url) = egress_ip_url {
                    provider = provider.with_egress_ip_url(egress_ip_url.clone());
                }
                Ok(Arc::new(provider))
            }
            _ => Err(Error::config("Invalid config for Zhima provider")),
        }
    }
}

/// Register the Zhima provider with a registry
///
/// # Example
///
/// ```rust
/// use proxypool_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// proxypool_provider_zhima::register(&registry);
/// assert!(registry.has_provider("zhima"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("zhima", Box::new(ZhimaFactory));
}
