//! Test doubles and common utilities for architecture contract tests
//!
//! These doubles verify engine behavior (idempotency, backoff, shutdown)
//! without talking to a real registry or proxy.

use routesync_core::config::{EngineConfig, SinkConfig, SourceConfig, SyncConfig};
use routesync_core::error::{Error, Result};
use routesync_core::render::{Fingerprint, RenderedConfig};
use routesync_core::traits::{ChangeNotice, ConfigSink, TargetSource};
use routesync_core::{RouteSet, Target};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// A target source whose fetch results and change notices are scripted by
/// the test
pub struct ControlledTargetSource {
    /// Receiver handed to the engine's watch stream
    engine_rx: Arc<std::sync::Mutex<Option<mpsc::Receiver<ChangeNotice>>>>,
    /// Scripted fetch results, consumed front to back
    scripted: Arc<std::sync::Mutex<VecDeque<Result<RouteSet>>>>,
    /// Returned once the script is exhausted
    fallback: Arc<std::sync::Mutex<RouteSet>>,
    /// Call counter for fetch()
    fetch_call_count: Arc<AtomicUsize>,
}

impl ControlledTargetSource {
    /// Create a controlled source returning `fallback` from fetch, plus a
    /// sender the test uses to emit change notices
    pub fn new(fallback: RouteSet) -> (Self, mpsc::Sender<ChangeNotice>) {
        let (notice_tx, engine_rx) = mpsc::channel(16);

        let source = Self {
            engine_rx: Arc::new(std::sync::Mutex::new(Some(engine_rx))),
            scripted: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            fallback: Arc::new(std::sync::Mutex::new(fallback)),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        };

        (source, notice_tx)
    }

    /// Queue a scripted result for the next fetch call
    pub fn push_result(&self, result: Result<RouteSet>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    /// Replace the fallback route set
    pub fn set_routes(&self, routes: RouteSet) {
        *self.fallback.lock().unwrap() = routes;
    }

    /// Get the number of times fetch() was called
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Create a source sharing state and counters with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            engine_rx: Arc::clone(&other.engine_rx),
            scripted: Arc::clone(&other.scripted),
            fallback: Arc::clone(&other.fallback),
            fetch_call_count: Arc::clone(&other.fetch_call_count),
        }
    }
}

#[async_trait::async_trait]
impl TargetSource for ControlledTargetSource {
    async fn fetch(&self) -> Result<RouteSet> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }
        Ok(self.fallback.lock().unwrap().clone())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>> {
        // Take the receiver (only called once)
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A config sink that records apply attempts and can be scripted to fail
pub struct MockConfigSink {
    /// Counter of apply attempts, failed ones included
    apply_call_count: Arc<AtomicUsize>,
    /// Scripted failures, consumed front to back
    failures: Arc<std::sync::Mutex<VecDeque<Error>>>,
    /// Fingerprints of successfully applied documents, in order
    applied: Arc<std::sync::Mutex<Vec<Fingerprint>>>,
}

impl MockConfigSink {
    pub fn new() -> Self {
        Self {
            apply_call_count: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            applied: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Queue a failure for the next apply call
    pub fn push_failure(&self, error: Error) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Get the number of apply attempts (failed ones included)
    pub fn apply_call_count(&self) -> usize {
        self.apply_call_count.load(Ordering::SeqCst)
    }

    /// Fingerprints of successfully applied documents, in order
    pub fn applied_fingerprints(&self) -> Vec<Fingerprint> {
        self.applied.lock().unwrap().clone()
    }

    /// Number of successful writes
    pub fn success_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    /// Create a sink sharing counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            apply_call_count: Arc::clone(&other.apply_call_count),
            failures: Arc::clone(&other.failures),
            applied: Arc::clone(&other.applied),
        }
    }
}

#[async_trait::async_trait]
impl ConfigSink for MockConfigSink {
    async fn apply(&self, config: &RenderedConfig) -> Result<()> {
        self.apply_call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.applied
            .lock()
            .unwrap()
            .push(config.fingerprint().clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "mock"
    }
}

/// Helper to create a minimal SyncConfig for testing
///
/// The poll interval is long enough that scheduled ticks never interfere
/// with notice-driven tests, and backoff delays are in the tens of
/// milliseconds so retries complete quickly.
pub fn minimal_config() -> SyncConfig {
    SyncConfig {
        source: SourceConfig::File {
            path: "/tmp/targets.json".to_string(),
            poll_interval_secs: 15,
        },
        sink: SinkConfig::File {
            path: "/tmp/dynamic.json".to_string(),
        },
        engine: EngineConfig {
            poll_interval_secs: 3600,
            call_timeout_secs: 5,
            backoff_base_ms: 10,
            backoff_cap_ms: 100,
            unhealthy_policy: Default::default(),
            event_channel_capacity: 100,
        },
    }
}

/// Two healthy backends behind the same virtual host
pub fn sample_routes() -> RouteSet {
    RouteSet::from_targets(vec![
        Target::new("a", "x.test", "10.0.0.1", 80),
        Target::new("b", "x.test", "10.0.0.2", 80),
    ])
}

/// A different routing picture, to force a configuration change
pub fn changed_routes() -> RouteSet {
    RouteSet::from_targets(vec![
        Target::new("a", "x.test", "10.0.0.1", 80),
        Target::new("c", "y.test", "10.0.0.3", 8080),
    ])
}
