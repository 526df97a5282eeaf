//! Deterministic configuration rendering
//!
//! [`Renderer::render`] is a pure function from a [`RouteSet`] to a
//! [`RenderedConfig`]: no I/O, no clock, no randomness. The document is a
//! proxy dynamic-configuration JSON tree (`http.routers` / `http.services`)
//! with all map keys sorted and group members in priority/identifier order,
//! so two semantically equal route sets always produce byte-identical
//! output and therefore equal fingerprints.

use crate::config::UnhealthyPolicy;
use crate::error::{Error, Result};
use crate::model::RouteSet;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Content hash used to detect no-op reconciliations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 of the given bytes, hex-encoded
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Display shows a short digest; full hex is available via as_str().
impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// An immutable, serialized configuration document plus its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    document: String,
    fingerprint: Fingerprint,
    routes: usize,
    targets: usize,
}

impl RenderedConfig {
    /// The serialized document
    pub fn document(&self) -> &str {
        &self.document
    }

    /// The document bytes, as a sink writes them
    pub fn as_bytes(&self) -> &[u8] {
        self.document.as_bytes()
    }

    /// Content fingerprint of the document
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Number of routes in the document
    pub fn routes(&self) -> usize {
        self.routes
    }

    /// Number of backend servers across all routes
    pub fn targets(&self) -> usize {
        self.targets
    }
}

/// Pure renderer mapping a route set to a canonical document
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    policy: UnhealthyPolicy,
}

impl Renderer {
    /// Create a renderer with the given unhealthy-target policy
    pub fn new(policy: UnhealthyPolicy) -> Self {
        Self { policy }
    }

    /// Render a route set into a canonical configuration document
    ///
    /// Rejects a group containing duplicate target identifiers and targets
    /// with an empty rule host. A group whose targets are all unhealthy is
    /// handled per the configured [`UnhealthyPolicy`].
    pub fn render(&self, routes: &RouteSet) -> Result<RenderedConfig> {
        let mut routers = Map::new();
        let mut services = Map::new();
        let mut server_count = 0usize;

        for (key, members) in routes.groups() {
            if key.host.is_empty() {
                return Err(Error::validation("target with empty rule host"));
            }

            let mut seen = BTreeSet::new();
            for target in &members {
                if !seen.insert(target.id.as_str()) {
                    return Err(Error::validation(format!(
                        "duplicate target identifier '{}' in route {}",
                        target.id, key
                    )));
                }
            }

            let healthy: Vec<_> = members.iter().filter(|t| t.healthy).collect();
            if healthy.is_empty() && self.policy == UnhealthyPolicy::Omit {
                tracing::debug!("route {} has no healthy targets, omitted", key);
                continue;
            }

            // Sanitized names are not injective ("my-app.test" and
            // "my.app.test" both sanitize to "my-app-test"); disambiguate
            // so no group can overwrite an earlier one. Group iteration is
            // ordered, so suffix assignment is deterministic.
            let mut name = key.route_name();
            if routers.contains_key(&name) {
                let base = name.clone();
                let mut n = 2;
                while routers.contains_key(&name) {
                    name = format!("{}-{}", base, n);
                    n += 1;
                }
            }

            let mut router = Map::new();
            let mut middlewares: Vec<String> = members
                .iter()
                .flat_map(|t| t.middlewares.iter().cloned())
                .collect();
            middlewares.sort();
            middlewares.dedup();
            if !middlewares.is_empty() {
                router.insert("middlewares".to_string(), json!(middlewares));
            }
            let priority = members.first().map(|t| t.priority).unwrap_or(0);
            router.insert("priority".to_string(), json!(priority));
            router.insert("rule".to_string(), json!(key.rule()));
            router.insert("service".to_string(), json!(name));
            routers.insert(name.clone(), Value::Object(router));

            let servers: Vec<Value> = healthy
                .iter()
                .map(|t| json!({ "url": t.upstream_url() }))
                .collect();
            server_count += servers.len();
            services.insert(name, json!({ "loadBalancer": { "servers": servers } }));
        }

        let routes_rendered = routers.len();
        let doc = json!({ "http": { "routers": routers, "services": services } });
        let document = serde_json::to_string_pretty(&doc)?;
        let fingerprint = Fingerprint::of_bytes(document.as_bytes());

        Ok(RenderedConfig {
            document,
            fingerprint,
            routes: routes_rendered,
            targets: server_count,
        })
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(UnhealthyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Target;

    fn two_backend_set() -> RouteSet {
        RouteSet::from_targets(vec![
            Target::new("a", "x.test", "10.0.0.1", 80),
            Target::new("b", "x.test", "10.0.0.2", 80),
        ])
    }

    #[test]
    fn single_route_lists_backends_in_identifier_order() {
        let rendered = Renderer::default().render(&two_backend_set()).unwrap();
        let doc: Value = serde_json::from_str(rendered.document()).unwrap();

        let routers = doc["http"]["routers"].as_object().unwrap();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers["x-test"]["rule"], "Host(`x.test`)");

        let servers = doc["http"]["services"]["x-test"]["loadBalancer"]["servers"]
            .as_array()
            .unwrap();
        assert_eq!(servers[0]["url"], "http://10.0.0.1:80");
        assert_eq!(servers[1]["url"], "http://10.0.0.2:80");
    }

    #[test]
    fn render_is_byte_identical_across_permutations() {
        let a = Target::new("a", "x.test", "10.0.0.1", 80);
        let b = Target::new("b", "x.test", "10.0.0.2", 80);
        let c = Target::new("c", "y.test", "10.0.0.3", 8080).with_priority(5);

        let renderer = Renderer::default();
        let forward = renderer
            .render(&RouteSet::from_targets(vec![a.clone(), b.clone(), c.clone()]))
            .unwrap();
        let shuffled = renderer
            .render(&RouteSet::from_targets(vec![c, a, b]))
            .unwrap();

        assert_eq!(forward.document(), shuffled.document());
        assert_eq!(forward.fingerprint(), shuffled.fingerprint());
    }

    #[test]
    fn duplicate_identifiers_in_group_are_rejected() {
        let set = RouteSet::from_targets(vec![
            Target::new("a", "x.test", "10.0.0.1", 80),
            Target::new("a", "x.test", "10.0.0.2", 80),
        ]);
        let err = Renderer::default().render(&set).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn omit_policy_drops_unhealthy_route() {
        let set = RouteSet::from_targets(vec![
            Target::new("a", "x.test", "10.0.0.1", 80).unhealthy(),
        ]);
        let rendered = Renderer::new(UnhealthyPolicy::Omit).render(&set).unwrap();
        assert_eq!(rendered.routes(), 0);
    }

    #[test]
    fn placeholder_policy_keeps_router_with_empty_servers() {
        let set = RouteSet::from_targets(vec![
            Target::new("a", "x.test", "10.0.0.1", 80).unhealthy(),
        ]);
        let rendered = Renderer::new(UnhealthyPolicy::Placeholder)
            .render(&set)
            .unwrap();
        assert_eq!(rendered.routes(), 1);
        assert_eq!(rendered.targets(), 0);

        let doc: Value = serde_json::from_str(rendered.document()).unwrap();
        let servers = doc["http"]["services"]["x-test"]["loadBalancer"]["servers"]
            .as_array()
            .unwrap();
        assert!(servers.is_empty());
    }

    #[test]
    fn middleware_tags_are_sorted_and_deduplicated() {
        let mut a = Target::new("a", "x.test", "10.0.0.1", 80);
        a.middlewares = vec!["ratelimit".to_string(), "auth".to_string()];
        let mut b = Target::new("b", "x.test", "10.0.0.2", 80);
        b.middlewares = vec!["auth".to_string()];

        let rendered = Renderer::default()
            .render(&RouteSet::from_targets(vec![a, b]))
            .unwrap();
        let doc: Value = serde_json::from_str(rendered.document()).unwrap();
        assert_eq!(
            doc["http"]["routers"]["x-test"]["middlewares"],
            json!(["auth", "ratelimit"])
        );
    }

    #[test]
    fn colliding_sanitized_names_render_distinct_routes() {
        // Both hosts sanitize to "my-app-test".
        let set = RouteSet::from_targets(vec![
            Target::new("a", "my-app.test", "10.0.0.1", 80),
            Target::new("b", "my.app.test", "10.0.0.2", 80),
        ]);

        let rendered = Renderer::default().render(&set).unwrap();
        assert_eq!(rendered.routes(), 2);

        let doc: Value = serde_json::from_str(rendered.document()).unwrap();
        let routers = doc["http"]["routers"].as_object().unwrap();
        assert_eq!(routers["my-app-test"]["rule"], "Host(`my-app.test`)");
        assert_eq!(routers["my-app-test-2"]["rule"], "Host(`my.app.test`)");

        // Each router points at its own service.
        let services = doc["http"]["services"].as_object().unwrap();
        assert_eq!(
            services["my-app-test"]["loadBalancer"]["servers"][0]["url"],
            "http://10.0.0.1:80"
        );
        assert_eq!(
            services["my-app-test-2"]["loadBalancer"]["servers"][0]["url"],
            "http://10.0.0.2:80"
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let renderer = Renderer::default();
        let one = renderer.render(&two_backend_set()).unwrap();
        let other = renderer
            .render(&RouteSet::from_targets(vec![Target::new(
                "a", "x.test", "10.0.0.9", 80,
            )]))
            .unwrap();
        assert_ne!(one.fingerprint(), other.fingerprint());
    }
}
