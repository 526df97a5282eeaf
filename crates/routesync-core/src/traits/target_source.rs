// # Target Source Trait
//
// Defines the interface for discovering backend targets and watching the
// registry for change.
//
// ## Implementations
//
// - Docker Engine API: `routesync-source-docker` crate
// - File-based: `routesync-source-file` crate
//
// ## Responsibilities
//
// Sources are observers, not decision-makers. A source:
// - fetches the current route set on demand (the engine bounds the call
//   with its configured timeout)
// - may emit change notices to request a reconciliation sooner than the
//   next scheduled tick
// - never applies configuration, never retries, never decides whether a
//   write is needed; all of that is owned by the engine, which is the sole
//   writer of applied state
//
// On a transient failure, `fetch` returns the error without mutating any
// previously returned state; the engine keeps its own last-applied
// fingerprint.

use crate::model::RouteSet;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// A request to reconcile sooner than the next scheduled tick
///
/// Carries no routing data on purpose: the notifier thread only enqueues
/// the request, and the engine re-fetches through `fetch` so that every
/// write flows through the single control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    /// Name of the source that observed the change
    pub source: String,
    /// When the change was observed
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl ChangeNotice {
    /// Create a change notice stamped with the current time
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            observed_at: chrono::Utc::now(),
        }
    }
}

/// Trait for target source implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Fetch the current set of backend targets and their routing intent
    ///
    /// Registry failures are normalized into `Error::Discovery` with the
    /// proper transient/permanent classification rather than propagated as
    /// raw transport errors.
    ///
    /// # Returns
    ///
    /// - `Ok(RouteSet)`: The current desired routing picture
    /// - `Err(Error)`: If the registry could not be queried
    async fn fetch(&self) -> Result<RouteSet, crate::Error>;

    /// Watch the registry for change
    ///
    /// Returns a stream yielding a [`ChangeNotice`] whenever the source
    /// observes that the backend set may have changed. The stream is lazy,
    /// runs indefinitely under normal conditions, and must be
    /// cancellation-safe: dropping it releases any registry connection the
    /// source holds.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing target sources from configuration
pub trait TargetSourceFactory: Send + Sync {
    /// Create a TargetSource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn TargetSource>, crate::Error>;
}
