//! Local health snapshot, updated by the heartbeat loop and readable by
//! anything that needs the agent's degraded/online state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Three consecutive heartbeat failures mark the agent `degraded`.
const DEGRADED_AFTER_FAILURES: u32 = 3;

#[derive(Debug, Default)]
pub struct HealthState {
    degraded: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.degraded.store(false, Ordering::Relaxed);
    }

    /// Records a failed heartbeat, returning the updated degraded state.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let degraded = failures >= DEGRADED_AFTER_FAILURES;
        if degraded {
            self.degraded.store(true, Ordering::Relaxed);
        }
        degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_degraded_after_three_failures() {
        let state = HealthState::new();
        assert!(!state.record_failure());
        assert!(!state.record_failure());
        assert!(state.record_failure());
        assert!(state.is_degraded());
    }

    #[test]
    fn success_clears_degraded_state() {
        let state = HealthState::new();
        for _ in 0..3 {
            state.record_failure();
        }
        assert!(state.is_degraded());
        state.record_success();
        assert!(!state.is_degraded());
    }
}
