//! Core reconciliation engine
//!
//! The SyncEngine drives the discover → render → diff → write cycle:
//! - Fetching the desired routing picture via TargetSource
//! - Rendering it into a canonical document
//! - Diffing against the last-applied fingerprint for idempotency
//! - Applying changed documents via ConfigSink
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ TargetSource │── ChangeNotice / tick ──┐
//! └──────────────┘                         │
//!                                          ▼
//!                                 ┌──────────────┐
//!                                 │  SyncEngine  │
//!                                 └──────────────┘
//!                                          │
//!              ┌───────────────────────────┼──────────────────────────┐
//!              │                           │                          │
//!              ▼                           ▼                          ▼
//!      ┌──────────────┐           ┌──────────────┐           ┌──────────────┐
//!      │   Renderer   │           │  ConfigSink  │           │    Events    │
//!      │ (canonical)  │           │  (atomic)    │           │   (notify)   │
//!      └──────────────┘           └──────────────┘           └──────────────┘
//! ```
//!
//! ## Cycle flow
//!
//! 1. Trigger: scheduled tick or change notice from the source
//! 2. Fetch the current route set (bounded by the per-call timeout)
//! 3. Render the canonical document and fingerprint it
//! 4. Skip the write when the fingerprint matches the applied state
//! 5. Apply via the sink; record the fingerprint only after success
//!
//! At most one reconciliation is in flight at any time: the loop runs the
//! cycle inline, so a new trigger cannot start a cycle while a write is
//! still in progress. The applied state is updated only by the loop task.

use crate::backoff::BackoffPolicy;
use crate::config::SyncConfig;
use crate::diff::{AppliedState, should_apply};
use crate::error::{Error, Result};
use crate::render::{Fingerprint, Renderer};
use crate::traits::{ConfigSink, TargetSource};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        source: String,
        sink: String,
    },

    /// Cycle rendered the same document that is already applied
    ReconcileSkipped {
        fingerprint: Fingerprint,
    },

    /// A new document was written to the proxy
    ConfigApplied {
        fingerprint: Fingerprint,
        previous: Option<Fingerprint>,
        routes: usize,
        targets: usize,
    },

    /// A cycle failed
    ReconcileFailed {
        error: String,
        transient: bool,
        consecutive_failures: u32,
    },

    /// The loop entered its backoff delay
    BackoffEntered {
        delay_ms: u64,
        consecutive_failures: u32,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Result of a single reconciliation cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new document was written and recorded
    Applied {
        /// Fingerprint of the written document
        fingerprint: Fingerprint,
    },
    /// The rendered document matched the applied state; no write issued
    Unchanged {
        /// Fingerprint of the rendered document
        fingerprint: Fingerprint,
    },
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Run one synchronous pass with [`SyncEngine::process()`] so first-run
///    misconfiguration fails loudly
/// 3. Enter [`SyncEngine::run()`]; the loop converts per-cycle failures
///    into backoff instead of propagating them
/// 4. Shutdown signal cancels in-flight waits promptly, including the
///    backoff sleep
///
/// ## Load Resistance
///
/// - **Bounded event channel**: monitoring events are dropped (with a
///   warning) rather than growing memory without bound
/// - **Bounded calls**: every discovery and write call carries a timeout;
///   an unbounded call is a defect
/// - **Jittered backoff**: consecutive transient failures back off
///   exponentially up to a cap
pub struct SyncEngine {
    /// Target source for discovery
    source: Box<dyn TargetSource>,

    /// Sink the rendered document is applied through
    sink: Box<dyn ConfigSink>,

    /// Pure renderer (policy baked in from config)
    renderer: Renderer,

    /// Fingerprint of the last successful write; written only by the loop
    applied: RwLock<AppliedState>,

    /// Scheduled reconciliation interval
    poll_interval: Duration,

    /// Bound on each discovery/write call
    call_timeout: Duration,

    /// Delay policy after transient failures
    backoff: BackoffPolicy,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events for logging or monitoring.
    pub fn new(
        source: Box<dyn TargetSource>,
        sink: Box<dyn ConfigSink>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            source,
            sink,
            renderer: Renderer::new(config.engine.unhealthy_policy),
            applied: RwLock::new(AppliedState::empty()),
            poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
            call_timeout: Duration::from_secs(config.engine.call_timeout_secs),
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.engine.backoff_base_ms),
                Duration::from_millis(config.engine.backoff_cap_ms),
            ),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Fingerprint of the last successfully applied configuration
    ///
    /// Always a fingerprint of a document that was actually written, never
    /// a speculative one.
    pub async fn applied_fingerprint(&self) -> Option<Fingerprint> {
        self.applied.read().await.fingerprint().cloned()
    }

    /// Run exactly one reconciliation cycle synchronously
    ///
    /// Unlike the loop, any failure propagates to the caller, so a
    /// misconfigured first run is detected immediately instead of being
    /// absorbed into backoff.
    pub async fn process(&self) -> Result<CycleOutcome> {
        self.reconcile_once().await
    }

    /// Run the reconciliation loop until a shutdown signal arrives
    ///
    /// Cycles are triggered by the scheduled tick and by change notices
    /// from the source. Transient failures (including validation errors)
    /// drive a jittered backoff and retry; permanent failures are logged
    /// and the loop returns to idle. The loop itself never exits on a
    /// single-cycle failure.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Test-only helper to run the engine with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: contract tests require controlled shutdown.
    /// Production code should use `run()`, which manages shutdown via OS
    /// signals (SIGTERM/SIGINT) rather than programmatic channels.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            source: self.source.source_name().to_string(),
            sink: self.sink.sink_name().to_string(),
        });

        let mut notices = self.source.watch();

        // First tick fires one full interval after start: the daemon runs
        // process() before entering the loop, so an immediate tick would be
        // a guaranteed skip.
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = match shutdown_rx {
            Some(rx) => Box::pin(async move {
                let _ = rx.await;
            }),
            None => Box::pin(async {
                let _ = tokio::signal::ctrl_c().await;
            }),
        };

        let mut consecutive_failures: u32 = 0;

        'control: loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("scheduled reconciliation tick");
                }
                Some(notice) = notices.next() => {
                    debug!(source = %notice.source, "change notice received");
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break 'control;
                }
            }

            // Retry through backoff until the cycle succeeds, fails
            // permanently, or shutdown interrupts the delay.
            loop {
                match self.reconcile_once().await {
                    Ok(_) => {
                        consecutive_failures = 0;
                        break;
                    }
                    Err(e) if e.is_transient() => {
                        consecutive_failures += 1;
                        let delay = self.backoff.delay(consecutive_failures);
                        warn!(
                            "reconciliation failed ({}), retrying in {:?} (failure #{})",
                            e, delay, consecutive_failures
                        );
                        self.emit_event(EngineEvent::ReconcileFailed {
                            error: e.to_string(),
                            transient: true,
                            consecutive_failures,
                        });
                        self.emit_event(EngineEvent::BackoffEntered {
                            delay_ms: delay.as_millis() as u64,
                            consecutive_failures,
                        });

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = &mut shutdown => {
                                info!("shutdown signal received during backoff");
                                break 'control;
                            }
                        }
                    }
                    Err(e) => {
                        // Surfaced to the operator; not retried until the
                        // next trigger so a broken registry or proxy is not
                        // hammered with known-bad requests.
                        consecutive_failures = 0;
                        error!("reconciliation failed permanently: {}", e);
                        self.emit_event(EngineEvent::ReconcileFailed {
                            error: e.to_string(),
                            transient: false,
                            consecutive_failures: 0,
                        });
                        break;
                    }
                }
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: "shutdown signal".to_string(),
        });
        info!("engine stopped");

        Ok(())
    }

    /// One pass through discover → render → diff → write
    async fn reconcile_once(&self) -> Result<CycleOutcome> {
        debug!("discovering targets via {}", self.source.source_name());
        let routes = tokio::time::timeout(self.call_timeout, self.source.fetch())
            .await
            .map_err(|_| {
                Error::discovery_transient(format!(
                    "discovery timed out after {:?}",
                    self.call_timeout
                ))
            })??;

        let rendered = self.renderer.render(&routes)?;

        {
            let applied = self.applied.read().await;
            if !should_apply(&rendered, &applied) {
                debug!(
                    "configuration unchanged (fingerprint {}), skipping write",
                    rendered.fingerprint()
                );
                self.emit_event(EngineEvent::ReconcileSkipped {
                    fingerprint: rendered.fingerprint().clone(),
                });
                return Ok(CycleOutcome::Unchanged {
                    fingerprint: rendered.fingerprint().clone(),
                });
            }
        }

        tokio::time::timeout(self.call_timeout, self.sink.apply(&rendered))
            .await
            .map_err(|_| {
                Error::write_transient(format!("write timed out after {:?}", self.call_timeout))
            })??;

        // Recorded only after the sink confirmed the write.
        let previous = {
            let mut applied = self.applied.write().await;
            applied.record(rendered.fingerprint().clone())
        };

        info!(
            "applied configuration {} ({} routes, {} backends) via {}",
            rendered.fingerprint(),
            rendered.routes(),
            rendered.targets(),
            self.sink.sink_name()
        );
        self.emit_event(EngineEvent::ConfigApplied {
            fingerprint: rendered.fingerprint().clone(),
            previous,
            routes: rendered.routes(),
            targets: rendered.targets(),
        });

        Ok(CycleOutcome::Applied {
            fingerprint: rendered.fingerprint().clone(),
        })
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Channel full: monitoring is slower than event generation.
            // Dropping keeps memory bounded.
            warn!("event channel full, dropping event");
        }
    }
}
