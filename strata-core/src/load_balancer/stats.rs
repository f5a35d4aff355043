//! Load balancer counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters shared by the coordinator and every worker selector.
///
/// Updates use relaxed atomics; the values are observability signals and
/// never order other memory.
#[derive(Debug, Default)]
pub struct LbStats {
    lb_healthy_panic: AtomicU64,
    refresh_success: AtomicU64,
    refresh_failure: AtomicU64,
}

impl LbStats {
    /// Fresh counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_healthy_panic(&self) {
        self.lb_healthy_panic.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_refresh_success(&self) {
        self.refresh_success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_refresh_failure(&self) {
        self.refresh_failure.fetch_add(1, Ordering::Relaxed);
    }

    /// Selections resolved through a priority in panic.
    pub fn lb_healthy_panic(&self) -> u64 {
        self.lb_healthy_panic.load(Ordering::Relaxed)
    }

    /// Refreshes that published a snapshot.
    pub fn refresh_success(&self) -> u64 {
        self.refresh_success.load(Ordering::Relaxed)
    }

    /// Refreshes abandoned because a selector failed to build.
    pub fn refresh_failure(&self) -> u64 {
        self.refresh_failure.load(Ordering::Relaxed)
    }
}
