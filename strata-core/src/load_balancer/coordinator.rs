//! Rebuilds routing state whenever membership or health changes.
//!
//! All expensive work (priority weighting, ring and table construction)
//! happens here, off the request path. The result is published as one
//! snapshot, so workers see either the previous routing state or the new one
//! in full.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::config::LbConfig;
use crate::domain::priority_set::PrioritySet;
use crate::error::Result;
use crate::load_balancer::priority::PriorityWeighting;
use crate::load_balancer::publisher::SnapshotPublisher;
use crate::load_balancer::selector::SelectorFactory;
use crate::load_balancer::snapshot::{PriorityState, SharedSnapshot, Snapshot};
use crate::load_balancer::stats::LbStats;
use crate::load_balancer::worker::WorkerSelector;

/// Keeps the published snapshot in step with a [`PrioritySet`].
pub struct Coordinator {
    priority_set: Arc<PrioritySet>,
    weighting: PriorityWeighting,
    factory: Arc<dyn SelectorFactory>,
    publisher: Arc<SnapshotPublisher>,
    stats: Arc<LbStats>,
    generation: AtomicU64,
    subscribed: AtomicBool,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("factory", &self.factory.name())
            .field("weighting", &self.weighting)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator for `priority_set` using the configured policy.
    pub fn new(priority_set: Arc<PrioritySet>, config: &LbConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::with_factory(priority_set, config, config.selector_factory()))
    }

    /// Create a coordinator with an explicit selector factory.
    pub fn with_factory(
        priority_set: Arc<PrioritySet>,
        config: &LbConfig,
        factory: Arc<dyn SelectorFactory>,
    ) -> Arc<Self> {
        let stats = Arc::new(LbStats::new());
        Arc::new(Self {
            priority_set,
            weighting: PriorityWeighting::new(config),
            factory,
            publisher: Arc::new(SnapshotPublisher::new(Arc::clone(&stats))),
            stats,
            generation: AtomicU64::new(0),
            subscribed: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Subscribe to membership changes and publish the first snapshot.
    ///
    /// The subscription holds only a weak reference, so dropping the last
    /// `Arc<Coordinator>` stops refreshes. If the first refresh fails the
    /// subscription stays in place and workers see no snapshot until a later
    /// change refreshes successfully.
    ///
    /// Calling it again only refreshes; the subscription is registered once.
    pub fn initialize(self: &Arc<Self>) -> Result<SharedSnapshot> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return self.refresh();
        }
        let weak = Arc::downgrade(self);
        self.priority_set
            .add_member_update_cb(move |priority, added, removed| {
                let Some(coordinator) = weak.upgrade() else {
                    return;
                };
                trace!(
                    priority,
                    added = added.len(),
                    removed = removed.len(),
                    "membership changed, refreshing"
                );
                // Failures are already logged and counted by refresh.
                let _ = coordinator.refresh();
            });

        self.refresh()
    }

    /// Rebuild routing state for every priority and publish it.
    ///
    /// On error nothing is published and the previous snapshot stays current.
    /// Concurrent calls run one at a time, so generations are published in
    /// order and the last refresh to finish reflects the newest membership.
    pub fn refresh(&self) -> Result<SharedSnapshot> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let host_sets = self.priority_set.host_sets();
        let assessment = self.weighting.assess(&host_sets);

        let mut priority_states = Vec::with_capacity(host_sets.len());
        for (host_set, &panic) in host_sets.iter().zip(&assessment.panic) {
            let selector = match self.factory.build(host_set, panic) {
                Ok(selector) => selector,
                Err(e) => {
                    self.stats.inc_refresh_failure();
                    warn!(
                        priority = host_set.priority(),
                        algorithm = self.factory.name(),
                        error = %e,
                        "selector build failed, keeping previous snapshot"
                    );
                    return Err(e);
                }
            };
            priority_states.push(PriorityState::new(panic, selector));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = Snapshot::new(
            generation,
            priority_states,
            assessment.healthy_load,
            assessment.degraded_load,
        )
        .inspect_err(|e| {
            self.stats.inc_refresh_failure();
            warn!(error = %e, "refusing to publish inconsistent snapshot");
        })?;

        let snapshot = self.publisher.publish(snapshot);
        self.stats.inc_refresh_success();
        debug!(
            generation,
            priorities = snapshot.priority_count(),
            healthy_load = ?snapshot.healthy_load(),
            degraded_load = ?snapshot.degraded_load(),
            "published routing snapshot"
        );
        Ok(snapshot)
    }

    /// The publisher workers read from.
    pub fn publisher(&self) -> &Arc<SnapshotPublisher> {
        &self.publisher
    }

    /// Counters for this target group.
    pub fn stats(&self) -> &Arc<LbStats> {
        &self.stats
    }

    /// Create a worker selector bound to the current snapshot.
    pub fn create_worker(&self) -> WorkerSelector {
        self.publisher.create_worker()
    }
}
