//! Plugin-based source/sink registry
//!
//! The registry allows target sources and config sinks to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains in the daemon.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In routesync-sink-file crate
//! pub fn register(registry: &SyncRegistry) {
//!     registry.register_sink("file", Box::new(FileSinkFactory));
//! }
//! ```

use crate::config::{SinkConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::traits::{ConfigSink, ConfigSinkFactory, TargetSource, TargetSourceFactory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry mapping type names to source/sink factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SyncRegistry {
    /// Registered target source factories
    sources: RwLock<HashMap<String, Box<dyn TargetSourceFactory>>>,

    /// Registered config sink factories
    sinks: RwLock<HashMap<String, Box<dyn ConfigSinkFactory>>>,
}

impl SyncRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target source factory
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn TargetSourceFactory>) {
        let name = name.into();
        let mut sources = self.sources.write().unwrap();
        sources.insert(name, factory);
    }

    /// Register a config sink factory
    pub fn register_sink(&self, name: impl Into<String>, factory: Box<dyn ConfigSinkFactory>) {
        let name = name.into();
        let mut sinks = self.sinks.write().unwrap();
        sinks.insert(name, factory);
    }

    /// Create a target source from configuration
    pub fn create_source(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap();

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a config sink from configuration
    pub fn create_sink(&self, config: &SinkConfig) -> Result<Box<dyn ConfigSink>> {
        let sink_type = config.type_name();
        let sinks = self.sinks.read().unwrap();

        let factory = sinks
            .get(sink_type)
            .ok_or_else(|| Error::config(format!("Unknown sink type: {}", sink_type)))?;

        factory.create(config)
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap();
        sources.keys().cloned().collect()
    }

    /// List all registered sink types
    pub fn list_sinks(&self) -> Vec<String> {
        let sinks = self.sinks.read().unwrap();
        sinks.keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap();
        sources.contains_key(name)
    }

    /// Check if a sink type is registered
    pub fn has_sink(&self, name: &str) -> bool {
        let sinks = self.sinks.read().unwrap();
        sinks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockSinkFactory;

    impl ConfigSinkFactory for MockSinkFactory {
        fn create(&self, _config: &SinkConfig) -> Result<Box<dyn ConfigSink>> {
            Err(Error::config("mock sink not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = SyncRegistry::new();

        assert!(!registry.has_sink("mock"));

        registry.register_sink("mock", Box::new(MockSinkFactory));

        assert!(registry.has_sink("mock"));
        assert!(registry.list_sinks().contains(&"mock".to_string()));
    }

    #[test]
    fn unknown_source_type_is_a_config_error() {
        let registry = SyncRegistry::new();
        let config = SourceConfig::File {
            path: "/tmp/targets.json".to_string(),
            poll_interval_secs: 15,
        };
        // The Ok type is a boxed trait object without Debug, so take the
        // error side without formatting the success side.
        let err = registry.create_source(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
