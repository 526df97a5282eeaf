// # Config Sink Trait
//
// Defines the interface for applying a rendered document to the proxy's
// configuration store.
//
// ## Implementations
//
// - File sink (atomic rename into a watched path): `routesync-sink-file`
// - HTTP admin API sink: `routesync-sink-http`
//
// ## Atomicity
//
// The proxy must never observe a partially written document. File sinks
// write to a temporary location and rename; HTTP sinks issue one request
// carrying the whole document. On a mid-write failure the previously
// applied configuration stays intact and observable.
//
// ## Responsibilities
//
// Sinks are single-shot: one apply call performs one write attempt and
// reports success or a classified failure. Retry, backoff, and the decision
// whether a write is needed at all are owned by the engine.

use crate::render::RenderedConfig;
use async_trait::async_trait;

/// Trait for proxy configuration sink implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    /// Apply a rendered document to the proxy
    ///
    /// Failures are classified: `Error::Write { kind: Transient }` for
    /// retry-eligible conditions (I/O pressure, 5xx, timeouts) and
    /// `{ kind: Permanent }` when the proxy rejects the document outright.
    async fn apply(&self, config: &RenderedConfig) -> Result<(), crate::Error>;

    /// Get the sink name (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}

/// Helper trait for constructing config sinks from configuration
pub trait ConfigSinkFactory: Send + Sync {
    /// Create a ConfigSink instance from configuration
    fn create(&self, config: &crate::config::SinkConfig)
    -> Result<Box<dyn ConfigSink>, crate::Error>;
}
