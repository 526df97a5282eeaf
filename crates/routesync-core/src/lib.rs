// # routesync-core
//
// Core library for the proxy-configuration reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping a reverse
// proxy's dynamic routing configuration synchronized with observed backend
// state:
// - **TargetSource**: Trait for discovering backend targets and signaling change
// - **ConfigSink**: Trait for applying a rendered document to the proxy
// - **Renderer**: Pure, deterministic route-set → document mapping
// - **AppliedState / should_apply**: Fingerprint-based idempotence guard
// - **SyncEngine**: Control loop orchestrating discover → render → diff → write
// - **SyncRegistry**: Plugin-based registry for sources and sinks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from integrations
// 2. **Single Writer**: The engine loop is the only writer of applied state;
//    notifiers only request reconciliation
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Idempotency**: Identical route sets never cause a second write
// 5. **Availability**: No single-cycle failure crashes the loop

pub mod backoff;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod render;
pub mod traits;

// Re-export core types for convenience
pub use config::{SinkConfig, SourceConfig, SyncConfig, UnhealthyPolicy};
pub use diff::{AppliedState, should_apply};
pub use engine::{CycleOutcome, EngineEvent, SyncEngine};
pub use error::{Error, Result};
pub use model::{RouteKey, RouteSet, Target};
pub use registry::SyncRegistry;
pub use render::{Fingerprint, RenderedConfig, Renderer};
pub use traits::{ChangeNotice, ConfigSink, TargetSource};
