//! Per-worker host selection.

use std::sync::Arc;

use rand::Rng;

use crate::domain::host::SharedHost;
use crate::load_balancer::priority::choose_priority;
use crate::load_balancer::snapshot::SharedSnapshot;
use crate::load_balancer::stats::LbStats;

/// What the request layer can tell the load balancer about a request.
pub trait LoadBalancerContext {
    /// A stable hash for requests that should stick to the same host.
    ///
    /// May be computed on demand; it is called at most once per selection.
    fn compute_hash_key(&self) -> Option<u64> {
        None
    }
}

/// A context carrying a precomputed hash key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashKey(pub u64);

impl LoadBalancerContext for HashKey {
    fn compute_hash_key(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// Chooses hosts from the snapshot it was created with.
///
/// A worker selector never refreshes itself. To observe newer routing state a
/// worker creates a new selector from the publisher; until then it keeps using
/// its own snapshot, which stays alive for as long as the selector does.
#[derive(Debug, Clone)]
pub struct WorkerSelector {
    snapshot: Option<SharedSnapshot>,
    stats: Arc<LbStats>,
}

impl WorkerSelector {
    /// Bind a selector to `snapshot`.
    pub fn new(snapshot: Option<SharedSnapshot>, stats: Arc<LbStats>) -> Self {
        Self { snapshot, stats }
    }

    /// The snapshot this selector routes with.
    pub fn snapshot(&self) -> Option<&SharedSnapshot> {
        self.snapshot.as_ref()
    }

    /// Generation of the bound snapshot.
    pub fn generation(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.generation())
    }

    /// Choose a host for a request.
    ///
    /// Returns `None` when no snapshot existed at construction or when the
    /// chosen priority has no host to offer. Without a hash key the choice is
    /// random.
    pub fn choose_host(&self, context: Option<&dyn LoadBalancerContext>) -> Option<SharedHost> {
        let snapshot = self.snapshot.as_ref()?;

        let hash = context
            .and_then(|ctx| ctx.compute_hash_key())
            .unwrap_or_else(|| rand::rng().random::<u64>());

        let (priority, _) = choose_priority(hash, snapshot.healthy_load(), snapshot.degraded_load());
        let state = snapshot.priority_state(priority)?;
        if state.panic() {
            self.stats.inc_healthy_panic();
        }
        state.selector().choose_host(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::{Host, HostId};
    use crate::load_balancer::selector::SubordinateSelector;
    use crate::load_balancer::snapshot::{PriorityState, Snapshot};
    use std::cell::Cell;

    /// Returns host `hash % n` from a fixed list.
    #[derive(Debug)]
    struct Modulo(Vec<SharedHost>);

    impl SubordinateSelector for Modulo {
        fn choose_host(&self, hash: u64) -> Option<SharedHost> {
            if self.0.is_empty() {
                return None;
            }
            Some(self.0[(hash % self.0.len() as u64) as usize].clone())
        }
    }

    struct CountingContext {
        key: Option<u64>,
        calls: Cell<usize>,
    }

    impl LoadBalancerContext for CountingContext {
        fn compute_hash_key(&self) -> Option<u64> {
            self.calls.set(self.calls.get() + 1);
            self.key
        }
    }

    fn host(id: u32) -> SharedHost {
        Arc::new(Host::new(HostId(id), format!("10.3.0.{}:80", id).parse().unwrap()))
    }

    fn worker(panic: [bool; 2], healthy: [u32; 2]) -> WorkerSelector {
        let states = vec![
            PriorityState::new(panic[0], Box::new(Modulo(vec![host(0), host(1)]))),
            PriorityState::new(panic[1], Box::new(Modulo(vec![host(10)]))),
        ];
        let snapshot = Snapshot::new(1, states, healthy.to_vec(), vec![0, 0]).unwrap();
        WorkerSelector::new(Some(Arc::new(snapshot)), Arc::new(LbStats::new()))
    }

    #[test]
    fn test_no_snapshot_returns_none() {
        let worker = WorkerSelector::new(None, Arc::new(LbStats::new()));
        assert!(worker.choose_host(Some(&HashKey(1))).is_none());
        assert!(worker.choose_host(None).is_none());
        assert_eq!(worker.generation(), None);
    }

    #[test]
    fn test_hash_key_drives_priority_and_host() {
        let worker = worker([false, false], [50, 50]);
        // Bucket 1 -> priority 0, host 0 % 2.
        assert_eq!(worker.choose_host(Some(&HashKey(0))).unwrap().id, HostId(0));
        // Bucket 52 -> priority 1.
        assert_eq!(worker.choose_host(Some(&HashKey(51))).unwrap().id, HostId(10));
        // Bucket 2 -> priority 0, host 101 % 2.
        assert_eq!(worker.choose_host(Some(&HashKey(101))).unwrap().id, HostId(1));
    }

    #[test]
    fn test_hash_key_computed_once() {
        let worker = worker([false, false], [100, 0]);
        let ctx = CountingContext {
            key: Some(3),
            calls: Cell::new(0),
        };
        worker.choose_host(Some(&ctx));
        assert_eq!(ctx.calls.get(), 1);

        let ctx = CountingContext {
            key: None,
            calls: Cell::new(0),
        };
        assert!(worker.choose_host(Some(&ctx)).is_some());
        assert_eq!(ctx.calls.get(), 1);
    }

    #[test]
    fn test_random_without_context_stays_in_loaded_priority() {
        let worker = worker([false, false], [100, 0]);
        for _ in 0..200 {
            let id = worker.choose_host(None).unwrap().id;
            assert!(id == HostId(0) || id == HostId(1));
        }
    }

    #[test]
    fn test_panic_counter_only_for_panicking_priority() {
        let worker = worker([true, false], [50, 50]);
        worker.choose_host(Some(&HashKey(0)));
        worker.choose_host(Some(&HashKey(10)));
        assert_eq!(worker.stats.lb_healthy_panic(), 2);
        worker.choose_host(Some(&HashKey(75)));
        assert_eq!(worker.stats.lb_healthy_panic(), 2);
    }
}
