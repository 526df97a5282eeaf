//! Core traits for the routesync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`TargetSource`]: Discover backend targets and signal change
//! - [`ConfigSink`]: Apply a rendered document to the proxy

pub mod config_sink;
pub mod target_source;

pub use config_sink::{ConfigSink, ConfigSinkFactory};
pub use target_source::{ChangeNotice, TargetSource, TargetSourceFactory};
