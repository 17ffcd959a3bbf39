//! Time source for history coalescing and highlight budgets.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond clock.
pub trait Clock: Debug {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock driven by hand. Clones share the same time.
///
/// With a non-zero step, every read advances the clock by that many milliseconds, which lets
/// a time-budgeted loop run out of budget deterministically.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    step: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
            step: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the current time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance by `step` on every read.
    pub fn set_auto_advance(&self, step: u64) {
        self.step.store(step, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let step = self.step.load(Ordering::SeqCst);
        self.now.fetch_add(step, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        other.advance(5);
        assert_eq!(clock.now_ms(), 15);
        clock.set_auto_advance(3);
        assert_eq!(clock.now_ms(), 15);
        assert_eq!(other.now_ms(), 18);
    }
}
