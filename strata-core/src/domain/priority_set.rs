//! Host membership grouped by priority.
//!
//! The priority set is the membership side of the load balancer: it owns the
//! per-priority host lists, classifies them by health, and notifies listeners
//! whenever membership or health changes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

use crate::domain::host::{HealthStatus, HostId, SharedHost};

/// Hosts of one priority, classified by health at the time the set was built.
#[derive(Debug, Clone)]
pub struct HostSet {
    priority: u32,
    hosts: Vec<SharedHost>,
    healthy_hosts: Vec<SharedHost>,
    degraded_hosts: Vec<SharedHost>,
}

impl HostSet {
    /// Classify `hosts` by their current health.
    pub fn new(priority: u32, hosts: Vec<SharedHost>) -> Self {
        let mut healthy_hosts = Vec::new();
        let mut degraded_hosts = Vec::new();
        for host in &hosts {
            match host.health() {
                HealthStatus::Healthy => healthy_hosts.push(Arc::clone(host)),
                HealthStatus::Degraded => degraded_hosts.push(Arc::clone(host)),
                HealthStatus::Unhealthy => {}
            }
        }
        Self {
            priority,
            hosts,
            healthy_hosts,
            degraded_hosts,
        }
    }

    /// A priority with no hosts.
    pub fn empty(priority: u32) -> Self {
        Self::new(priority, Vec::new())
    }

    /// Priority level of this set (0 is the most preferred).
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Every host, regardless of health.
    pub fn hosts(&self) -> &[SharedHost] {
        &self.hosts
    }

    /// Hosts classified healthy.
    pub fn healthy_hosts(&self) -> &[SharedHost] {
        &self.healthy_hosts
    }

    /// Hosts classified degraded.
    pub fn degraded_hosts(&self) -> &[SharedHost] {
        &self.degraded_hosts
    }

    /// Hosts a selector should be built over.
    ///
    /// In panic every host is eligible. Otherwise healthy hosts are used,
    /// falling back to degraded ones when nothing is healthy.
    pub fn hosts_for_selection(&self, in_panic: bool) -> &[SharedHost] {
        if in_panic {
            &self.hosts
        } else if !self.healthy_hosts.is_empty() {
            &self.healthy_hosts
        } else {
            &self.degraded_hosts
        }
    }

    fn same_classification(&self, other: &HostSet) -> bool {
        fn ids(hosts: &[SharedHost]) -> Vec<HostId> {
            hosts.iter().map(|h| h.id).collect()
        }
        ids(&self.healthy_hosts) == ids(&other.healthy_hosts)
            && ids(&self.degraded_hosts) == ids(&other.degraded_hosts)
    }
}

/// Callback fired with `(priority, hosts_added, hosts_removed)`.
pub type MemberUpdateCb = Arc<dyn Fn(u32, &[SharedHost], &[SharedHost]) + Send + Sync>;

/// Ordered host sets for every configured priority.
///
/// Readers get a consistent view of all priorities through [`host_sets`](Self::host_sets).
/// Writers are serialized, and callbacks for one change finish before the next
/// change is applied, so listeners observe changes one at a time and in order.
/// Callbacks must not call back into the mutating methods of the same set.
pub struct PrioritySet {
    host_sets: ArcSwap<Vec<Arc<HostSet>>>,
    callbacks: Mutex<Vec<MemberUpdateCb>>,
    update_lock: Mutex<()>,
}

impl std::fmt::Debug for PrioritySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrioritySet")
            .field("host_sets", &self.host_sets.load_full())
            .finish_non_exhaustive()
    }
}

impl Default for PrioritySet {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PrioritySet {
    /// Create a priority set with no priorities.
    pub fn new() -> Self {
        Self {
            host_sets: ArcSwap::from_pointee(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            update_lock: Mutex::new(()),
        }
    }

    /// Current host sets, indexed by priority.
    pub fn host_sets(&self) -> Arc<Vec<Arc<HostSet>>> {
        self.host_sets.load_full()
    }

    /// Number of configured priorities.
    pub fn priority_count(&self) -> usize {
        self.host_sets.load().len()
    }

    /// Register a callback for membership and health changes.
    pub fn add_member_update_cb<F>(&self, cb: F)
    where
        F: Fn(u32, &[SharedHost], &[SharedHost]) + Send + Sync + 'static,
    {
        lock(&self.callbacks).push(Arc::new(cb));
    }

    /// Replace the membership of `priority`.
    ///
    /// Lower priorities that do not exist yet are created empty. Added and
    /// removed hosts are derived by [`HostId`].
    pub fn update_hosts(&self, priority: u32, hosts: Vec<SharedHost>) {
        let _guard = lock(&self.update_lock);

        let current = self.host_sets.load_full();
        let index = priority as usize;
        let previous: &[SharedHost] = current.get(index).map(|hs| hs.hosts()).unwrap_or(&[]);

        let previous_ids: HashSet<HostId> = previous.iter().map(|h| h.id).collect();
        let new_ids: HashSet<HostId> = hosts.iter().map(|h| h.id).collect();
        let added: Vec<SharedHost> = hosts
            .iter()
            .filter(|h| !previous_ids.contains(&h.id))
            .cloned()
            .collect();
        let removed: Vec<SharedHost> = previous
            .iter()
            .filter(|h| !new_ids.contains(&h.id))
            .cloned()
            .collect();

        let mut next: Vec<Arc<HostSet>> = current.as_ref().clone();
        while next.len() <= index {
            next.push(Arc::new(HostSet::empty(next.len() as u32)));
        }
        next[index] = Arc::new(HostSet::new(priority, hosts));
        self.host_sets.store(Arc::new(next));

        debug!(
            priority,
            added = added.len(),
            removed = removed.len(),
            "priority membership updated"
        );
        self.notify(priority, &added, &removed);
    }

    /// Reclassify every priority from the current health of its hosts.
    ///
    /// Listeners are notified once per priority whose classification changed.
    /// Returns the number of such priorities.
    pub fn recompute_health(&self) -> usize {
        let _guard = lock(&self.update_lock);

        let current = self.host_sets.load_full();
        let mut changed = Vec::new();
        let next: Vec<Arc<HostSet>> = current
            .iter()
            .map(|hs| {
                let reclassified = HostSet::new(hs.priority(), hs.hosts().to_vec());
                if reclassified.same_classification(hs) {
                    Arc::clone(hs)
                } else {
                    changed.push(hs.priority());
                    Arc::new(reclassified)
                }
            })
            .collect();

        if changed.is_empty() {
            return 0;
        }
        self.host_sets.store(Arc::new(next));

        for &priority in &changed {
            debug!(priority, "priority health changed");
            self.notify(priority, &[], &[]);
        }
        changed.len()
    }

    fn notify(&self, priority: u32, added: &[SharedHost], removed: &[SharedHost]) {
        let callbacks: Vec<MemberUpdateCb> = lock(&self.callbacks).clone();
        trace!(priority, listeners = callbacks.len(), "notifying member update listeners");
        for cb in callbacks {
            cb(priority, added, removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::Host;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host(id: u32) -> SharedHost {
        Arc::new(Host::new(
            HostId(id),
            format!("10.0.0.{}:8080", id).parse().unwrap(),
        ))
    }

    #[test]
    fn test_host_set_classification() {
        let hosts = vec![host(1), host(2), host(3)];
        hosts[1].set_health(HealthStatus::Degraded);
        hosts[2].set_health(HealthStatus::Unhealthy);

        let set = HostSet::new(0, hosts);
        assert_eq!(set.hosts().len(), 3);
        assert_eq!(set.healthy_hosts()[0].id, HostId(1));
        assert_eq!(set.degraded_hosts()[0].id, HostId(2));
        assert_eq!(set.hosts_for_selection(false).len(), 1);
        assert_eq!(set.hosts_for_selection(true).len(), 3);
    }

    #[test]
    fn test_selection_falls_back_to_degraded() {
        let hosts = vec![host(1), host(2)];
        hosts[0].set_health(HealthStatus::Degraded);
        hosts[1].set_health(HealthStatus::Unhealthy);

        let set = HostSet::new(0, hosts);
        let selected = set.hosts_for_selection(false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, HostId(1));
    }

    #[test]
    fn test_update_hosts_creates_intermediate_priorities() {
        let set = PrioritySet::new();
        set.update_hosts(2, vec![host(1)]);

        let sets = set.host_sets();
        assert_eq!(sets.len(), 3);
        for (index, hs) in sets.iter().enumerate() {
            assert_eq!(hs.priority() as usize, index);
        }
        assert!(sets[0].hosts().is_empty());
        assert_eq!(sets[2].hosts().len(), 1);
    }

    #[test]
    fn test_update_hosts_reports_added_and_removed() {
        let set = PrioritySet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set.add_member_update_cb(move |priority, added, removed| {
            let added: Vec<u32> = added.iter().map(|h| h.id.0).collect();
            let removed: Vec<u32> = removed.iter().map(|h| h.id.0).collect();
            sink.lock().unwrap().push((priority, added, removed));
        });

        set.update_hosts(0, vec![host(1), host(2)]);
        set.update_hosts(0, vec![host(2), host(3)]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (0, vec![1, 2], vec![]));
        assert_eq!(seen[1], (0, vec![3], vec![1]));
    }

    #[test]
    fn test_recompute_health_notifies_only_changed_priorities() {
        let set = PrioritySet::new();
        let p0 = vec![host(1), host(2)];
        let p1 = vec![host(3)];
        set.update_hosts(0, p0.clone());
        set.update_hosts(1, p1);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        set.add_member_update_cb(move |priority, added, removed| {
            assert_eq!(priority, 0);
            assert!(added.is_empty() && removed.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(set.recompute_health(), 0);
        p0[0].set_health(HealthStatus::Unhealthy);
        assert_eq!(set.recompute_health(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(set.host_sets()[0].healthy_hosts().len(), 1);
    }
}
