// # proxypoold - Proxy Pool Daemon
//
// Thin integration layer over proxypool-core. Ingestion, expiry and retry
// behaviour all live in the core; this binary only:
//
// 1. Reads configuration from a JSON file or environment variables
// 2. Initializes logging and the runtime
// 3. Registers built-in providers
// 4. Starts the orchestrator and stops it on SIGTERM/SIGINT
//
// ## Configuration
//
// `PROXYPOOL_CONFIG` points at a JSON document deserialized into `PoolConfig`.
// When it is unset, the environment variables below are used instead.
//
// ### Providers
// - `PROXYPOOL_PROVIDERS`: Comma-separated provider names (default: zhima)
// - `PROXYPOOL_ZHIMA_FETCH_URL`: Endpoint list URL, `{count}` is substituted.
//   Without it only the zhima provider is skipped; the others still start.
// - `PROXYPOOL_ZHIMA_BIND_URL`: Whitelist binding URL, `{ip}` is substituted
// - `PROXYPOOL_ZHIMA_EGRESS_IP_URL`: Egress address service
// - `PROXYPOOL_ZHIMA_BATCH_SIZE`: Endpoints per fetch
// - `PROXYPOOL_ZHIMA_INTERVAL_SECS`: Seconds between fetches
// - `PROXYPOOL_ZHIMA_SOURCE`: Source name recorded on endpoints
//
// ### Record Store
// - `PROXYPOOL_RECORD_STORE_TYPE`: memory or file
// - `PROXYPOOL_RECORD_STORE_PATH`: Path to the record file (for file store)
//
// ### Sweep
// - `PROXYPOOL_SWEEP_INTERVAL_SECS`: Seconds between sweeps
// - `PROXYPOOL_SWEEP_MARGIN_SECS`: Lead time before expiry
//
// - `PROXYPOOL_LOG_LEVEL`: trace, debug, info, warn or error
//
// ## Example
//
// ```bash
// export PROXYPOOL_ZHIMA_FETCH_URL='http://webapi.http.zhimacangku.com/getip?num={count}&type=2&appkey=...'
// export PROXYPOOL_ZHIMA_BIND_URL='http://web.http.cnapi.cc/index/index/save_white?white={ip}&appkey=...'
// export PROXYPOOL_RECORD_STORE_TYPE=file
// export PROXYPOOL_RECORD_STORE_PATH=/var/lib/proxypool/records.json
//
// proxypoold
// ```

use anyhow::{Context, Result};
use proxypool_core::{
    Orchestrator, PoolConfig, ProviderConfig, ProviderRegistry, RecordStoreConfig, SweepConfig,
};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on waiting for the loops to stop and the records to flush
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PoolExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PoolExitCode> for ExitCode {
    fn from(code: PoolExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    pool: PoolConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from `PROXYPOOL_CONFIG` or the environment
    fn from_env() -> Result<Self> {
        let log_level = env::var("PROXYPOOL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pool = match env::var("PROXYPOOL_CONFIG") {
            Ok(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read PROXYPOOL_CONFIG file {}", path))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse PROXYPOOL_CONFIG file {}", path))?
            }
            Err(_) => pool_config_from_vars(&|key: &str| env::var(key).ok())?,
        };

        Ok(Self { pool, log_level })
    }

    /// Validate the configuration
    ///
    /// Only checks what would stop the daemon as a whole. Per-provider
    /// problems are reported by the orchestrator and skip that provider.
    fn validate(&self) -> Result<()> {
        self.pool.validate()?;

        if self.pool.providers.is_empty() {
            anyhow::bail!(
                "No providers configured. \
                Set PROXYPOOL_PROVIDERS or add providers to the PROXYPOOL_CONFIG file"
            );
        }

        if let RecordStoreConfig::File { path } = &self.pool.record_store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "Record store parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        parse_log_level(&self.log_level)?;
        Ok(())
    }
}

/// Variable lookup, `std::env` in the daemon and a map in tests
type Vars<'a> = &'a dyn Fn(&str) -> Option<String>;

fn pool_config_from_vars(var: Vars<'_>) -> Result<PoolConfig> {
    let names: Vec<String> = var("PROXYPOOL_PROVIDERS")
        .unwrap_or_else(|| "zhima".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut providers = Vec::with_capacity(names.len());
    for name in names {
        let provider = match name.as_str() {
            "zhima" => zhima_from_vars(var)?,
            // Resolved against the registry at startup
            _ => ProviderConfig::custom(name),
        };
        providers.push(provider);
    }

    let record_store = match var("PROXYPOOL_RECORD_STORE_TYPE")
        .unwrap_or_else(|| "memory".to_string())
        .as_str()
    {
        "memory" => RecordStoreConfig::Memory,
        "file" => RecordStoreConfig::File {
            path: var("PROXYPOOL_RECORD_STORE_PATH").context(
                "PROXYPOOL_RECORD_STORE_PATH is required when PROXYPOOL_RECORD_STORE_TYPE=file",
            )?,
        },
        other => anyhow::bail!(
            "PROXYPOOL_RECORD_STORE_TYPE '{}' is not supported. \
            Supported types: memory, file",
            other
        ),
    };

    let defaults = SweepConfig::default();
    let sweep = SweepConfig {
        interval_secs: number(var, "PROXYPOOL_SWEEP_INTERVAL_SECS")?
            .unwrap_or(defaults.interval_secs),
        safety_margin_secs: number(var, "PROXYPOOL_SWEEP_MARGIN_SECS")?
            .unwrap_or(defaults.safety_margin_secs),
    };

    Ok(PoolConfig {
        providers,
        record_store,
        sweep,
        ..PoolConfig::default()
    })
}

/// Build the zhima entry
///
/// A missing fetch URL is left empty so that the orchestrator rejects this
/// provider alone instead of the whole daemon refusing to start.
fn zhima_from_vars(var: Vars<'_>) -> Result<ProviderConfig> {
    Ok(ProviderConfig::Zhima {
        source: var("PROXYPOOL_ZHIMA_SOURCE").unwrap_or_else(|| "zhima".to_string()),
        fetch_url: var("PROXYPOOL_ZHIMA_FETCH_URL").unwrap_or_default(),
        batch_size: number(var, "PROXYPOOL_ZHIMA_BATCH_SIZE")?.unwrap_or(10),
        poll_interval_secs: number(var, "PROXYPOOL_ZHIMA_INTERVAL_SECS")?.unwrap_or(30),
        bind_url: var("PROXYPOOL_ZHIMA_BIND_URL"),
        egress_ip_url: var("PROXYPOOL_ZHIMA_EGRESS_IP_URL"),
    })
}

/// Read a numeric variable; unset is `None`, unparsable is an error
fn number<T: std::str::FromStr>(var: Vars<'_>, key: &str) -> Result<Option<T>> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: {}", key, value)),
        None => Ok(None),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "PROXYPOOL_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PoolExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return PoolExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PoolExitCode::ConfigError.into();
    }

    info!("Starting proxypoold daemon");
    info!(
        "Configuration loaded: {} provider(s)",
        config.pool.providers.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PoolExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> PoolExitCode {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "zhima")]
    {
        info!("Registering Zhima provider");
        proxypool_provider_zhima::register(&registry);
    }

    let orchestrator = match Orchestrator::open(config.pool).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Failed to open record store: {}", e);
            return PoolExitCode::ConfigError;
        }
    };

    let (pool, mut events) = match orchestrator.start(&registry) {
        Ok(started) => started,
        Err(e) => {
            error!("Failed to start proxy pool: {}", e);
            return PoolExitCode::ConfigError;
        }
    };

    for (provider, e) in &pool.report().failed {
        warn!("Provider {} was not started: {}", provider, e);
    }

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Pool event");
        }
    });

    let signal_result = wait_for_shutdown_signal().await;
    match &signal_result {
        Ok(signal) => info!("Received shutdown signal: {}", signal),
        Err(e) => error!("Shutdown signal error: {}", e),
    }

    let exit = match tokio::time::timeout(SHUTDOWN_TIMEOUT, pool.shutdown()).await {
        Ok(Ok(())) if signal_result.is_ok() => PoolExitCode::CleanShutdown,
        Ok(Ok(())) => PoolExitCode::RuntimeError,
        Ok(Err(e)) => {
            error!("Shutdown error: {}", e);
            PoolExitCode::RuntimeError
        }
        Err(_) => {
            error!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
            PoolExitCode::RuntimeError
        }
    };

    event_logger.abort();
    info!("Daemon stopped");
    exit
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
