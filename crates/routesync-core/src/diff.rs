//! Applied-state tracking and the no-op write guard
//!
//! [`AppliedState`] holds the fingerprint of the last configuration that
//! was confirmed written. It starts empty, is updated only after a
//! successful write, and is never rolled back except by a later successful
//! write. The engine's loop task is its only writer, so any observed value
//! is the fingerprint of a configuration that was actually applied, never a
//! speculative one.

use crate::render::{Fingerprint, RenderedConfig};
use chrono::{DateTime, Utc};

/// Fingerprint of the last successfully written configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedState {
    fingerprint: Option<Fingerprint>,
    applied_at: Option<DateTime<Utc>>,
}

impl AppliedState {
    /// The empty state a process starts with
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fingerprint of the last applied configuration, if any
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// When the last configuration was applied, if any
    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }

    /// Record a confirmed successful write, returning the previous
    /// fingerprint
    pub fn record(&mut self, fingerprint: Fingerprint) -> Option<Fingerprint> {
        self.applied_at = Some(Utc::now());
        self.fingerprint.replace(fingerprint)
    }
}

/// Whether a candidate document needs to be written
///
/// Returns false when the candidate fingerprint equals the applied
/// fingerprint. This is the sole idempotence guard preventing redundant
/// writes that would make the proxy reload for nothing.
pub fn should_apply(candidate: &RenderedConfig, applied: &AppliedState) -> bool {
    applied.fingerprint() != Some(candidate.fingerprint())
}
