//! Immutable routing state shared by every worker.

use std::sync::Arc;

use crate::error::{LbError, Result};
use crate::load_balancer::selector::SubordinateSelector;

/// Routing state of one priority.
#[derive(Debug)]
pub struct PriorityState {
    panic: bool,
    selector: Box<dyn SubordinateSelector>,
}

impl PriorityState {
    /// Bundle a built selector with the priority's panic flag.
    pub fn new(panic: bool, selector: Box<dyn SubordinateSelector>) -> Self {
        Self { panic, selector }
    }

    /// Whether the priority was in panic when the selector was built.
    pub fn panic(&self) -> bool {
        self.panic
    }

    /// The priority's selector.
    pub fn selector(&self) -> &dyn SubordinateSelector {
        self.selector.as_ref()
    }
}

/// Routing state of every priority, produced by a single refresh.
///
/// The three per-priority sequences always have the same length. Nothing in a
/// snapshot changes after construction, so it can be read from any number of
/// threads without synchronization.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    priority_states: Vec<PriorityState>,
    healthy_load: Vec<u32>,
    degraded_load: Vec<u32>,
}

impl Snapshot {
    /// Assemble a snapshot, rejecting mismatched sequence lengths.
    pub fn new(
        generation: u64,
        priority_states: Vec<PriorityState>,
        healthy_load: Vec<u32>,
        degraded_load: Vec<u32>,
    ) -> Result<Self> {
        if priority_states.len() != healthy_load.len() || healthy_load.len() != degraded_load.len() {
            return Err(LbError::InconsistentSnapshot {
                states: priority_states.len(),
                healthy: healthy_load.len(),
                degraded: degraded_load.len(),
            });
        }
        Ok(Self {
            generation,
            priority_states,
            healthy_load,
            degraded_load,
        })
    }

    /// Refresh sequence number that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of priorities covered.
    pub fn priority_count(&self) -> usize {
        self.priority_states.len()
    }

    /// Per-priority state, indexed by priority.
    pub fn priority_states(&self) -> &[PriorityState] {
        &self.priority_states
    }

    /// Per-priority state for `priority`.
    pub fn priority_state(&self, priority: usize) -> Option<&PriorityState> {
        self.priority_states.get(priority)
    }

    /// Healthy traffic percentage per priority.
    pub fn healthy_load(&self) -> &[u32] {
        &self.healthy_load
    }

    /// Degraded traffic percentage per priority.
    pub fn degraded_load(&self) -> &[u32] {
        &self.degraded_load
    }
}

/// A shared, immutable snapshot.
pub type SharedSnapshot = Arc<Snapshot>;
