//! Configuration types for the routesync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main routesync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Target source configuration
    pub source: SourceConfig,

    /// Proxy configuration sink
    pub sink: SinkConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate()?;
        self.sink.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Target source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Docker Engine API source (container labels encode routing intent)
    Docker {
        /// API endpoint, e.g. "http://localhost:2375"
        endpoint: String,
        /// Label namespace, e.g. "routesync" for "routesync.rule.host"
        #[serde(default = "default_label_prefix")]
        label_prefix: String,
        /// Change-watch poll interval in seconds
        #[serde(default = "default_source_poll_secs")]
        poll_interval_secs: u64,
    },

    /// File-based source: a JSON target list on disk
    File {
        /// Path to the target list
        path: String,
        /// Change-watch poll interval in seconds
        #[serde(default = "default_source_poll_secs")]
        poll_interval_secs: u64,
    },

    /// Custom source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Docker {
                endpoint,
                label_prefix,
                poll_interval_secs,
            } => {
                if endpoint.is_empty() {
                    return Err(crate::Error::config("Docker endpoint cannot be empty"));
                }
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(crate::Error::config(
                        "Docker endpoint must use HTTP or HTTPS scheme",
                    ));
                }
                if label_prefix.is_empty() {
                    return Err(crate::Error::config("label prefix cannot be empty"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("source poll interval must be > 0"));
                }
                Ok(())
            }
            SourceConfig::File {
                path,
                poll_interval_secs,
            } => {
                if path.is_empty() {
                    return Err(crate::Error::config("file source path cannot be empty"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("source poll interval must be > 0"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Docker { .. } => "docker",
            SourceConfig::File { .. } => "file",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Proxy configuration sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// File sink: atomic rename into a path the proxy watches
    File {
        /// Destination path
        path: String,
    },

    /// HTTP sink: PUT the full document to a proxy admin API
    Http {
        /// Admin API endpoint accepting the document
        endpoint: String,
        /// Optional bearer token
        #[serde(default)]
        token: Option<String>,
    },

    /// Custom sink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SinkConfig {
    /// Validate the sink configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SinkConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("sink path cannot be empty"));
                }
                Ok(())
            }
            SinkConfig::Http { endpoint, .. } => {
                if endpoint.is_empty() {
                    return Err(crate::Error::config("sink endpoint cannot be empty"));
                }
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(crate::Error::config(
                        "sink endpoint must use HTTP or HTTPS scheme",
                    ));
                }
                Ok(())
            }
            SinkConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("custom sink factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("custom sink config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the sink type name
    pub fn type_name(&self) -> &str {
        match self {
            SinkConfig::File { .. } => "file",
            SinkConfig::Http { .. } => "http",
            SinkConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Policy for a route whose targets are all unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhealthyPolicy {
    /// Drop the route entirely; the proxy falls through to its 404 handling
    #[default]
    Omit,
    /// Keep the router with an empty server list so the proxy answers 503
    /// instead of mis-routing
    Placeholder,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduled reconciliation interval (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bound on every discovery and write call (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Backoff base delay after a transient failure (in milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap (in milliseconds)
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// How routes with zero healthy targets are rendered
    #[serde(default)]
    pub unhealthy_policy: UnhealthyPolicy,

    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("poll interval must be > 0"));
        }
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("call timeout must be > 0"));
        }
        if self.backoff_base_ms == 0 {
            return Err(crate::Error::config("backoff base must be > 0"));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(crate::Error::config("backoff cap must be >= backoff base"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            unhealthy_policy: UnhealthyPolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_label_prefix() -> String {
    "routesync".to_string()
}

fn default_source_poll_secs() -> u64 {
    15
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    30_000
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn backoff_cap_below_base_is_rejected() {
        let cfg = EngineConfig {
            backoff_base_ms: 1000,
            backoff_cap_ms: 100,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn docker_source_requires_http_scheme() {
        let cfg = SourceConfig::Docker {
            endpoint: "unix:///var/run/docker.sock".to_string(),
            label_prefix: "routesync".to_string(),
            poll_interval_secs: 15,
        };
        assert!(cfg.validate().is_err());
    }
}
