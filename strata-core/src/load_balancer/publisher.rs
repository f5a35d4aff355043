//! Publication point for the current routing snapshot.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::load_balancer::snapshot::{SharedSnapshot, Snapshot};
use crate::load_balancer::stats::LbStats;
use crate::load_balancer::worker::WorkerSelector;

/// Holds the current [`Snapshot`] for one target group.
///
/// Uses `ArcSwapOption` so publishing a snapshot is a single atomic pointer
/// swap and readers never take a lock. Only the coordinator publishes; worker
/// selectors read once, at construction. A reader sees either the snapshot
/// from before a concurrent publish or the one after it, never a mix.
#[derive(Debug)]
pub struct SnapshotPublisher {
    current: ArcSwapOption<Snapshot>,
    stats: Arc<LbStats>,
}

impl SnapshotPublisher {
    /// Create a publisher with no snapshot yet.
    pub fn new(stats: Arc<LbStats>) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            stats,
        }
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> SharedSnapshot {
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// The current snapshot, or `None` before the first publish.
    pub fn current(&self) -> Option<SharedSnapshot> {
        self.current.load_full()
    }

    /// Counters handed to the selectors this publisher creates.
    pub fn stats(&self) -> &Arc<LbStats> {
        &self.stats
    }

    /// Create a worker selector bound to the current snapshot.
    pub fn create_worker(&self) -> WorkerSelector {
        WorkerSelector::new(self.current(), Arc::clone(&self.stats))
    }
}
