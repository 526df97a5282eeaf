// # Docker Target Source
//
// Derives routing targets from containers published by a Docker Engine API
// endpoint. Containers opt in with labels:
//
// ```text
// routesync.enable=true
// routesync.rule.host=app.example.test      (required)
// routesync.rule.path_prefix=/api           (optional)
// routesync.port=8080                       (optional, default 80)
// routesync.address=10.0.0.5                (optional, default network IP)
// routesync.protocol=https                  (optional, default http)
// routesync.priority=10                     (optional, default 0)
// routesync.middlewares=auth,compress       (optional, comma separated)
// ```
//
// The label prefix ("routesync" above) is configurable so several daemons
// can share one Docker host.
//
// ## Per-entry tolerance
//
// One container with broken labels must not take down routing for every
// other container. Malformed entries are logged and skipped; the fetch as a
// whole only fails when the Docker API itself is unreachable or returns an
// unusable response.
//
// ## Watching
//
// The Engine API has no cheap change feed over plain HTTP polling, so
// `watch()` spawns a poll loop that fetches snapshots and emits a
// ChangeNotice whenever the derived RouteSet differs from the previous one.
// The notice only requests reconciliation; the engine does its own fetch.

use async_trait::async_trait;
use routesync_core::config::SourceConfig;
use routesync_core::model::{Protocol, RouteSet, Target};
use routesync_core::traits::{ChangeNotice, TargetSource, TargetSourceFactory};
use routesync_core::{Error, Result, SyncRegistry};
use serde::Deserialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

/// Default upstream port when no port label is present
const DEFAULT_PORT: u16 = 80;

/// Capacity of the watch notice channel
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// Container summary as returned by `GET /containers/json`
#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkSettings {
    #[serde(rename = "Networks", default)]
    networks: HashMap<String, Network>,
}

#[derive(Debug, Deserialize)]
struct Network {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl ContainerSummary {
    /// Stable identifier: the first container name without the leading slash
    fn name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|n| n.strip_prefix('/').unwrap_or(n))
            .filter(|n| !n.is_empty())
    }

    /// First non-empty network IP, in network-name order for determinism
    fn network_ip(&self) -> Option<&str> {
        let settings = self.network_settings.as_ref()?;
        let mut names: Vec<&String> = settings.networks.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                let ip = settings.networks[name].ip_address.as_str();
                (!ip.is_empty()).then_some(ip)
            })
            .next()
    }

    /// Running and not reported unhealthy by a container healthcheck
    fn is_healthy(&self) -> bool {
        self.state == "running" && !self.status.contains("(unhealthy)")
    }
}

/// Docker Engine API target source
#[derive(Debug, Clone)]
pub struct DockerSource {
    endpoint: String,
    label_prefix: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl DockerSource {
    /// Create a Docker source against an Engine API endpoint
    pub fn new(
        endpoint: impl Into<String>,
        label_prefix: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::config(format!(
                "Docker endpoint must be an http(s) URL, got: {}",
                endpoint
            )));
        }
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let label_prefix = label_prefix.into();
        if label_prefix.is_empty() {
            return Err(Error::config("Docker label prefix must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            label_prefix,
            poll_interval,
            client,
        })
    }

    /// Poll loop behind `watch()`
    ///
    /// Stops as soon as the notice stream is dropped, even when the
    /// container set never changes again.
    async fn poll_for_changes(self, tx: tokio::sync::mpsc::Sender<ChangeNotice>) {
        tracing::info!(
            "watching Docker endpoint {} (interval {:?})",
            self.endpoint,
            self.poll_interval
        );

        let mut last_seen: Option<RouteSet> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => {
                    tracing::debug!("notice stream dropped, stopping watch");
                    return;
                }
            }

            let snapshot = match self.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // Transient outages are the engine's concern only when
                    // its own fetch fails; the watcher just waits for the
                    // next tick.
                    tracing::debug!("watch snapshot failed: {}", e);
                    continue;
                }
            };

            if last_seen.as_ref() != Some(&snapshot) {
                last_seen = Some(snapshot);
                // Full channel means a notice is already pending.
                let _ = tx.try_send(ChangeNotice::new("docker"));
            }
        }
    }

    /// Fetch container summaries and derive the current route set
    async fn snapshot(&self) -> Result<RouteSet> {
        let url = format!("{}/containers/json?all=true", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|e| {
            Error::discovery_transient(format!("Docker API request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16()));
        }

        // A response that does not decode will not decode on retry either.
        let containers: Vec<ContainerSummary> = response.json().await.map_err(|e| {
            Error::discovery_permanent(format!("Failed to parse Docker API response: {}", e))
        })?;

        let mut routes = RouteSet::new();
        for container in &containers {
            match target_from_container(container, &self.label_prefix) {
                Ok(Some(target)) => routes.push(target),
                Ok(None) => {}
                Err(e) => {
                    // Skip the broken container, keep the rest routable.
                    tracing::warn!(
                        "ignoring container {}: {}",
                        container.name().unwrap_or("<unnamed>"),
                        e
                    );
                }
            }
        }
        Ok(routes)
    }
}

/// Map a Docker API response status to the engine's failure taxonomy
///
/// Bad credentials and other client-side rejections are permanent:
/// retrying the identical request cannot help, and the loop should log and
/// wait for the next trigger instead of hammering the daemon from backoff.
fn classify_status(status: u16) -> Error {
    match status {
        401 | 403 => Error::discovery_permanent(format!(
            "Docker API authentication failed (status {})",
            status
        )),
        429 => Error::discovery_transient(format!("Docker API rate limit (status {})", status)),
        500..=599 => {
            Error::discovery_transient(format!("Docker API server error (status {})", status))
        }
        _ => Error::discovery_permanent(format!("Docker API rejected request (status {})", status)),
    }
}

/// Derive a target from one container's labels
///
/// Returns `Ok(None)` for containers that have not opted in, `Err` for
/// containers that opted in with unusable labels.
fn target_from_container(container: &ContainerSummary, prefix: &str) -> Result<Option<Target>> {
    let label = |suffix: &str| container.labels.get(&format!("{}.{}", prefix, suffix));

    if label("enable").map(String::as_str) != Some("true") {
        return Ok(None);
    }

    let name = container
        .name()
        .ok_or_else(|| Error::validation("enabled container has no name"))?;

    let host = label("rule.host")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::validation(format!("{}: missing {}.rule.host label", name, prefix)))?;

    let address = match label("address").filter(|a| !a.is_empty()) {
        Some(address) => address.clone(),
        None => container
            .network_ip()
            .ok_or_else(|| {
                Error::validation(format!("{}: no network IP and no address label", name))
            })?
            .to_string(),
    };

    let port = match label("port") {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| Error::validation(format!("{}: invalid port label: {}", name, raw)))?,
        None => DEFAULT_PORT,
    };

    let mut target = Target::new(name, host.clone(), address, port);

    if let Some(prefix_label) = label("rule.path_prefix").filter(|p| !p.is_empty()) {
        target = target.with_path_prefix(prefix_label.clone());
    }

    if let Some(raw) = label("priority") {
        let priority = raw
            .parse::<i32>()
            .map_err(|_| Error::validation(format!("{}: invalid priority label: {}", name, raw)))?;
        target = target.with_priority(priority);
    }

    if let Some(raw) = label("protocol") {
        target.protocol = match raw.as_str() {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            other => {
                return Err(Error::validation(format!(
                    "{}: invalid protocol label: {}",
                    name, other
                )));
            }
        };
    }

    if let Some(raw) = label("middlewares") {
        target.middlewares = raw
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
    }

    if !container.is_healthy() {
        target = target.unhealthy();
    }

    Ok(Some(target))
}

#[async_trait]
impl TargetSource for DockerSource {
    async fn fetch(&self) -> Result<RouteSet> {
        self.snapshot().await
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::channel(NOTICE_CHANNEL_CAPACITY);

        tokio::spawn(self.clone().poll_for_changes(tx));

        Box::pin(ReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "docker"
    }
}

/// Factory for creating Docker sources
pub struct DockerSourceFactory;

impl TargetSourceFactory for DockerSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>> {
        match config {
            SourceConfig::Docker {
                endpoint,
                label_prefix,
                poll_interval_secs,
            } => Ok(Box::new(DockerSource::new(
                endpoint,
                label_prefix,
                Duration::from_secs(*poll_interval_secs),
            )?)),
            _ => Err(Error::config("Invalid config for docker source")),
        }
    }
}

/// Register the Docker source with a registry
pub fn register(registry: &SyncRegistry) {
    registry.register_source("docker", Box::new(DockerSourceFactory));
}
