//! Architectural Contract Test: Triggering
//!
//! Constraints verified:
//! - A change notice triggers a reconciliation without waiting for the
//!   scheduled tick
//! - The scheduled tick reconciles even when the source never notifies
//! - Notices only request reconciliation; all writes flow through the
//!   single control loop
//!
//! If this test fails, configuration lags the registry by a full poll
//! interval, or two writers can race.

mod common;

use common::*;
use routesync_core::SyncEngine;
use routesync_core::config::EngineConfig;
use routesync_core::traits::ChangeNotice;

#[tokio::test]
async fn change_notice_triggers_reconcile_before_tick() {
    // Poll interval is one hour; only the notice can trigger the cycle.
    let (source, notice_tx) = ControlledTargetSource::new(sample_routes());
    let source_handle = ControlledTargetSource::sharing_state_with(&source);
    let sink = MockConfigSink::new();
    let sink_handle = MockConfigSink::sharing_counters_with(&sink);

    let (engine, _events) = SyncEngine::new(Box::new(source), Box::new(sink), minimal_config())
        .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    assert_eq!(source_handle.fetch_call_count(), 0, "loop starts idle");

    notice_tx.try_send(ChangeNotice::new("test")).unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    assert_eq!(source_handle.fetch_call_count(), 1);
    assert_eq!(sink_handle.success_count(), 1);

    shutdown_tx.send(()).unwrap();
    engine_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn scheduled_tick_reconciles_without_notices() {
    let (source, _notice_tx) = ControlledTargetSource::new(sample_routes());
    let source_handle = ControlledTargetSource::sharing_state_with(&source);
    let sink = MockConfigSink::new();
    let sink_handle = MockConfigSink::sharing_counters_with(&sink);

    let mut config = minimal_config();
    config.engine = EngineConfig {
        poll_interval_secs: 1,
        ..config.engine
    };

    let (engine, _events) = SyncEngine::new(Box::new(source), Box::new(sink), config)
        .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    // First tick fires one interval after start.
    tokio::time::sleep(tokio::time::Duration::from_millis(1300)).await;

    assert!(source_handle.fetch_call_count() >= 1);
    assert_eq!(sink_handle.success_count(), 1);

    shutdown_tx.send(()).unwrap();
    engine_handle.await.unwrap().unwrap();
}
