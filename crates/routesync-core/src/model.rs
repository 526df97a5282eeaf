//! Routing data model
//!
//! - [`Target`]: one backend instance eligible to receive traffic
//! - [`RouteKey`]: the routing key a target is reachable under
//! - [`RouteSet`]: the complete desired routing picture at a point in time
//!
//! A `RouteSet` is an unordered bag of targets; deterministic ordering is
//! imposed when grouping (keys sort lexically, targets sort by priority
//! descending with identifier ties broken lexically). The renderer relies
//! on this so that two semantically equal route sets produce byte-identical
//! documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upstream protocol for a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP upstream
    #[default]
    Http,
    /// TLS upstream
    Https,
}

impl Protocol {
    /// URL scheme for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// One backend instance eligible to receive traffic for a route
///
/// The identifier is stable across reconciliation cycles for the same
/// logical backend (a container name, not a container id); the address may
/// change between cycles without changing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Stable identifier, unique per backend instance
    pub id: String,

    /// Upstream host (address or resolvable name)
    pub address: String,

    /// Upstream port
    pub port: u16,

    /// Upstream protocol
    #[serde(default)]
    pub protocol: Protocol,

    /// Virtual host this target serves
    pub rule_host: String,

    /// Optional path prefix under the virtual host
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Routing priority; higher wins, ties broken by identifier
    #[serde(default)]
    pub priority: i32,

    /// Middleware tags to attach to the route
    #[serde(default)]
    pub middlewares: Vec<String>,

    /// Whether the backend is currently able to serve traffic
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl Target {
    /// Create a healthy HTTP target with default routing attributes
    pub fn new(
        id: impl Into<String>,
        rule_host: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            protocol: Protocol::Http,
            rule_host: rule_host.into(),
            path_prefix: None,
            priority: 0,
            middlewares: Vec::new(),
            healthy: true,
        }
    }

    /// Set the path prefix
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Set the routing priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the target unhealthy
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// The routing key this target belongs to
    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            host: self.rule_host.clone(),
            path_prefix: self.path_prefix.clone(),
        }
    }

    /// Upstream URL the proxy should forward to
    pub fn upstream_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.address, self.port)
    }
}

/// Routing key: virtual host plus optional path prefix
///
/// Total lexical ordering (host, then prefix) gives deterministic grouping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    /// Virtual host
    pub host: String,
    /// Optional path prefix
    pub path_prefix: Option<String>,
}

impl RouteKey {
    /// Proxy rule expression for this key
    pub fn rule(&self) -> String {
        match &self.path_prefix {
            Some(prefix) => format!("Host(`{}`) && PathPrefix(`{}`)", self.host, prefix),
            None => format!("Host(`{}`)", self.host),
        }
    }

    /// Stable router/service name derived from the key
    pub fn route_name(&self) -> String {
        let mut name: String = self
            .host
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        if let Some(prefix) = &self.path_prefix {
            name.push_str("-p");
            name.extend(prefix.chars().map(|c| if c.is_alphanumeric() { c } else { '-' }));
        }
        name
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path_prefix {
            Some(prefix) => write!(f, "{}{}", self.host, prefix),
            None => write!(f, "{}", self.host),
        }
    }
}

/// The complete desired routing picture at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteSet {
    targets: Vec<Target>,
}

impl RouteSet {
    /// Create an empty route set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a route set from a list of targets
    pub fn from_targets(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    /// Add a target
    pub fn push(&mut self, target: Target) {
        self.targets.push(target);
    }

    /// Number of targets, healthy or not
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the set has no targets at all
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// All targets, in insertion order
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Group targets by routing key with deterministic ordering.
    ///
    /// Keys sort lexically; within a group, targets sort by priority
    /// descending, identifier ascending.
    pub fn groups(&self) -> BTreeMap<RouteKey, Vec<&Target>> {
        let mut groups: BTreeMap<RouteKey, Vec<&Target>> = BTreeMap::new();
        for target in &self.targets {
            groups.entry(target.route_key()).or_default().push(target);
        }
        for members in groups.values_mut() {
            members.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        groups
    }
}
