//! Exponential backoff with jitter.
//!
//! Drives the delay between retries after transient failures. The delay
//! doubles per consecutive failure, is capped, and carries 0-10% random
//! jitter so a fleet of reconcilers does not hammer a recovering registry
//! or proxy in lockstep.

use rand::Rng;
use std::time::Duration;

/// Backoff policy: base delay and cap
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    /// Create a policy from base and cap durations
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before retry number `attempt` (1-based)
    ///
    /// `attempt == 0` means no failure has happened and yields zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;

        let exponential = 2u64.saturating_pow(attempt - 1);
        let capped = base_ms.saturating_mul(exponential).min(cap_ms);

        // 0 to 10% of the capped delay
        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}
