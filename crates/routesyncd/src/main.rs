// # routesyncd - Proxy Configuration Reconciler Daemon
//
// routesyncd is a thin integration layer. It:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers the built-in sources and sinks
// 4. Runs one synchronous reconciliation pass, then the update loop
//
// All reconciliation logic lives in routesync-core; nothing here retries,
// renders, or diffs.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Target source
// - `ROUTESYNC_SOURCE_TYPE`: Source type (docker, file)
// - `ROUTESYNC_SOURCE_ENDPOINT`: Docker Engine API URL (for docker)
// - `ROUTESYNC_SOURCE_LABEL_PREFIX`: Label namespace (for docker, default "routesync")
// - `ROUTESYNC_SOURCE_PATH`: Path to the JSON target list (for file)
// - `ROUTESYNC_SOURCE_POLL_INTERVAL`: Change-watch interval in seconds
//
// ### Config sink
// - `ROUTESYNC_SINK_TYPE`: Sink type (file, http)
// - `ROUTESYNC_SINK_PATH`: Proxy-watched destination path (for file)
// - `ROUTESYNC_SINK_ENDPOINT`: Proxy admin API URL (for http)
// - `ROUTESYNC_SINK_TOKEN`: Bearer token for the admin API (optional)
//
// ### Engine
// - `ROUTESYNC_POLL_INTERVAL`: Scheduled reconcile interval in seconds
// - `ROUTESYNC_CALL_TIMEOUT`: Per-call timeout in seconds
// - `ROUTESYNC_BACKOFF_BASE_MS` / `ROUTESYNC_BACKOFF_CAP_MS`: Backoff shape
// - `ROUTESYNC_UNHEALTHY_POLICY`: omit or placeholder
//
// ### Logging
// - `ROUTESYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export ROUTESYNC_SOURCE_TYPE=docker
// export ROUTESYNC_SOURCE_ENDPOINT=http://localhost:2375
// export ROUTESYNC_SINK_TYPE=file
// export ROUTESYNC_SINK_PATH=/etc/traefik/dynamic/routesync.json
//
// routesyncd
// ```

use anyhow::Result;
use routesync_core::config::{EngineConfig, SinkConfig, SourceConfig, SyncConfig, UnhealthyPolicy};
use routesync_core::{EngineEvent, SyncEngine, SyncRegistry};
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error (including a failed first pass)
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration assembled from the environment
struct Config {
    source_type: String,
    source_endpoint: Option<String>,
    source_label_prefix: String,
    source_path: Option<String>,
    source_poll_interval: Option<u64>,
    sink_type: String,
    sink_path: Option<String>,
    sink_endpoint: Option<String>,
    sink_token: Option<String>,
    poll_interval: Option<u64>,
    call_timeout: Option<u64>,
    backoff_base_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    unhealthy_policy: String,
    log_level: String,
}

/// Parse an optional numeric environment variable, failing loudly on junk
fn parse_env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a number, got: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            source_type: env::var("ROUTESYNC_SOURCE_TYPE").unwrap_or_else(|_| "docker".to_string()),
            source_endpoint: env::var("ROUTESYNC_SOURCE_ENDPOINT").ok(),
            source_label_prefix: env::var("ROUTESYNC_SOURCE_LABEL_PREFIX")
                .unwrap_or_else(|_| "routesync".to_string()),
            source_path: env::var("ROUTESYNC_SOURCE_PATH").ok(),
            source_poll_interval: parse_env_u64("ROUTESYNC_SOURCE_POLL_INTERVAL")?,
            sink_type: env::var("ROUTESYNC_SINK_TYPE").unwrap_or_else(|_| "file".to_string()),
            sink_path: env::var("ROUTESYNC_SINK_PATH").ok(),
            sink_endpoint: env::var("ROUTESYNC_SINK_ENDPOINT").ok(),
            sink_token: env::var("ROUTESYNC_SINK_TOKEN").ok(),
            poll_interval: parse_env_u64("ROUTESYNC_POLL_INTERVAL")?,
            call_timeout: parse_env_u64("ROUTESYNC_CALL_TIMEOUT")?,
            backoff_base_ms: parse_env_u64("ROUTESYNC_BACKOFF_BASE_MS")?,
            backoff_cap_ms: parse_env_u64("ROUTESYNC_BACKOFF_CAP_MS")?,
            unhealthy_policy: env::var("ROUTESYNC_UNHEALTHY_POLICY")
                .unwrap_or_else(|_| "omit".to_string()),
            log_level: env::var("ROUTESYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Covers required field presence, URL schemes, numeric ranges, type
    /// enumeration, and placeholder credentials.
    fn validate(&self) -> Result<()> {
        // Validate source type and its required fields
        match self.source_type.as_str() {
            "docker" => {
                let endpoint = self.source_endpoint.as_deref().unwrap_or("");
                if endpoint.is_empty() {
                    anyhow::bail!(
                        "ROUTESYNC_SOURCE_ENDPOINT is required when ROUTESYNC_SOURCE_TYPE=docker. \
                        Set it via: export ROUTESYNC_SOURCE_ENDPOINT=http://localhost:2375"
                    );
                }
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    anyhow::bail!(
                        "ROUTESYNC_SOURCE_ENDPOINT must use HTTP or HTTPS scheme. Got: {}",
                        endpoint
                    );
                }
                if self.source_label_prefix.is_empty() {
                    anyhow::bail!("ROUTESYNC_SOURCE_LABEL_PREFIX cannot be empty");
                }
            }
            "file" => {
                if self.source_path.as_deref().unwrap_or("").is_empty() {
                    anyhow::bail!(
                        "ROUTESYNC_SOURCE_PATH is required when ROUTESYNC_SOURCE_TYPE=file. \
                        Set it via: export ROUTESYNC_SOURCE_PATH=/etc/routesync/targets.json"
                    );
                }
            }
            _ => anyhow::bail!(
                "ROUTESYNC_SOURCE_TYPE '{}' is not supported. \
                Supported types: docker, file",
                self.source_type
            ),
        }

        // Validate sink type and its required fields
        match self.sink_type.as_str() {
            "file" => {
                let path = self.sink_path.as_deref().unwrap_or("");
                if path.is_empty() {
                    anyhow::bail!(
                        "ROUTESYNC_SINK_PATH is required when ROUTESYNC_SINK_TYPE=file. \
                        Set it via: export ROUTESYNC_SINK_PATH=/etc/traefik/dynamic/routesync.json"
                    );
                }
            }
            "http" => {
                let endpoint = self.sink_endpoint.as_deref().unwrap_or("");
                if endpoint.is_empty() {
                    anyhow::bail!(
                        "ROUTESYNC_SINK_ENDPOINT is required when ROUTESYNC_SINK_TYPE=http"
                    );
                }
                if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                    anyhow::bail!(
                        "ROUTESYNC_SINK_ENDPOINT must use HTTP or HTTPS scheme. Got: {}",
                        endpoint
                    );
                }
                if endpoint.starts_with("http://") {
                    eprintln!(
                        "WARNING: ROUTESYNC_SINK_ENDPOINT uses HTTP (not HTTPS). \
                        Credentials travel in clear text."
                    );
                }
            }
            _ => anyhow::bail!(
                "ROUTESYNC_SINK_TYPE '{}' is not supported. \
                Supported types: file, http",
                self.sink_type
            ),
        }

        // Check for obvious placeholder tokens (common mistake)
        if let Some(ref token) = self.sink_token {
            let token_lower = token.to_lowercase();
            if token_lower.contains("your_token")
                || token_lower.contains("replace_me")
                || token_lower.contains("example")
                || token_lower == "token"
            {
                anyhow::bail!(
                    "ROUTESYNC_SINK_TOKEN appears to be a placeholder. \
                    Use an actual token from your proxy admin API."
                );
            }
        }

        // Validate numeric ranges
        if let Some(interval) = self.poll_interval
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "ROUTESYNC_POLL_INTERVAL must be between 1 and 3600 seconds. Got: {}",
                interval
            );
        }

        if let Some(interval) = self.source_poll_interval
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "ROUTESYNC_SOURCE_POLL_INTERVAL must be between 1 and 3600 seconds. Got: {}",
                interval
            );
        }

        if let Some(timeout) = self.call_timeout
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "ROUTESYNC_CALL_TIMEOUT must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        if let (Some(base), Some(cap)) = (self.backoff_base_ms, self.backoff_cap_ms)
            && cap < base
        {
            anyhow::bail!(
                "ROUTESYNC_BACKOFF_CAP_MS ({}) must be >= ROUTESYNC_BACKOFF_BASE_MS ({})",
                cap,
                base
            );
        }

        // Validate unhealthy policy
        match self.unhealthy_policy.as_str() {
            "omit" | "placeholder" => {}
            _ => anyhow::bail!(
                "ROUTESYNC_UNHEALTHY_POLICY '{}' is not valid. \
                Valid policies: omit, placeholder",
                self.unhealthy_policy
            ),
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ROUTESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the typed engine configuration
    fn sync_config(&self) -> Result<SyncConfig> {
        let mut engine = EngineConfig::default();
        if let Some(interval) = self.poll_interval {
            engine.poll_interval_secs = interval;
        }
        if let Some(timeout) = self.call_timeout {
            engine.call_timeout_secs = timeout;
        }
        if let Some(base) = self.backoff_base_ms {
            engine.backoff_base_ms = base;
        }
        if let Some(cap) = self.backoff_cap_ms {
            engine.backoff_cap_ms = cap;
        }
        engine.unhealthy_policy = match self.unhealthy_policy.as_str() {
            "placeholder" => UnhealthyPolicy::Placeholder,
            _ => UnhealthyPolicy::Omit,
        };

        let source = match self.source_type.as_str() {
            "docker" => SourceConfig::Docker {
                endpoint: self
                    .source_endpoint
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("missing source endpoint"))?,
                label_prefix: self.source_label_prefix.clone(),
                poll_interval_secs: self.source_poll_interval.unwrap_or(15),
            },
            "file" => SourceConfig::File {
                path: self
                    .source_path
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("missing source path"))?,
                poll_interval_secs: self.source_poll_interval.unwrap_or(15),
            },
            other => anyhow::bail!("unsupported source type: {}", other),
        };

        let sink = match self.sink_type.as_str() {
            "file" => SinkConfig::File {
                path: self
                    .sink_path
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("missing sink path"))?,
            },
            "http" => SinkConfig::Http {
                endpoint: self
                    .sink_endpoint
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("missing sink endpoint"))?,
                token: self.sink_token.clone(),
            },
            other => anyhow::bail!("unsupported sink type: {}", other),
        };

        Ok(SyncConfig {
            source,
            sink,
            engine,
        })
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting routesyncd daemon");
    info!(
        "source={} sink={}",
        config.source_type, config.sink_type
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> SyncExitCode {
    let registry = SyncRegistry::new();

    #[cfg(feature = "docker")]
    routesync_source_docker::register(&registry);

    #[cfg(feature = "file-source")]
    routesync_source_file::register(&registry);

    #[cfg(feature = "file-sink")]
    routesync_sink_file::register(&registry);

    #[cfg(feature = "http-sink")]
    routesync_sink_http::register(&registry);

    let sync_config = match config.sync_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {}", e);
            return SyncExitCode::ConfigError;
        }
    };

    let source = match registry.create_source(&sync_config.source) {
        Ok(source) => source,
        Err(e) => {
            error!(
                "Failed to create source '{}': {}. \
                Was the matching cargo feature enabled?",
                sync_config.source.type_name(),
                e
            );
            return SyncExitCode::ConfigError;
        }
    };

    let sink = match registry.create_sink(&sync_config.sink) {
        Ok(sink) => sink,
        Err(e) => {
            error!(
                "Failed to create sink '{}': {}. \
                Was the matching cargo feature enabled?",
                sync_config.sink.type_name(),
                e
            );
            return SyncExitCode::ConfigError;
        }
    };

    let (engine, mut events) = match SyncEngine::new(source, sink, sync_config) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to create engine: {}", e);
            return SyncExitCode::ConfigError;
        }
    };

    // Drain monitoring events into the log
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    // First pass runs synchronously: a misconfigured daemon must fail its
    // startup, not retry forever in the background.
    match engine.process().await {
        Ok(outcome) => info!("Initial reconciliation complete: {:?}", outcome),
        Err(e) => {
            error!("Initial reconciliation failed: {}", e);
            return SyncExitCode::ConfigError;
        }
    }

    info!("Entering update loop");
    match engine.run().await {
        Ok(()) => {
            info!("Shutting down daemon");
            SyncExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            SyncExitCode::RuntimeError
        }
    }
}

/// Translate an engine event into a log line
fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Started { source, sink } => {
            info!("engine started (source={}, sink={})", source, sink);
        }
        EngineEvent::ReconcileSkipped { fingerprint } => {
            info!("configuration unchanged ({})", fingerprint);
        }
        EngineEvent::ConfigApplied {
            fingerprint,
            previous,
            routes,
            targets,
        } => match previous {
            Some(previous) => info!(
                "configuration applied: {} -> {} ({} routes, {} targets)",
                previous, fingerprint, routes, targets
            ),
            None => info!(
                "configuration applied: {} ({} routes, {} targets)",
                fingerprint, routes, targets
            ),
        },
        EngineEvent::ReconcileFailed {
            error,
            transient,
            consecutive_failures,
        } => {
            if *transient {
                warn!(
                    "reconciliation failed ({} consecutive): {}",
                    consecutive_failures, error
                );
            } else {
                error!("reconciliation failed permanently: {}", error);
            }
        }
        EngineEvent::BackoffEntered {
            delay_ms,
            consecutive_failures,
        } => {
            warn!(
                "backing off {}ms after {} failure(s)",
                delay_ms, consecutive_failures
            );
        }
        EngineEvent::Stopped { reason } => {
            info!("engine stopped: {}", reason);
        }
    }
}
