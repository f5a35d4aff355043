//! Priority weighting.
//!
//! Converts per-priority health into the traffic percentages each priority
//! should receive and decides which priorities are in panic. Everything here is
//! a pure function of the host sets it is handed.

use std::sync::Arc;

use crate::config::LbConfig;
use crate::domain::priority_set::HostSet;

/// Whether a priority was chosen for its healthy or its degraded capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAvailability {
    /// Chosen from the healthy load distribution.
    Healthy,
    /// Chosen from the degraded load distribution.
    Degraded,
}

/// Load distribution and panic flags for every priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityAssessment {
    /// Percentage of traffic sent to each priority's healthy hosts.
    pub healthy_load: Vec<u32>,
    /// Percentage of traffic sent to each priority's degraded hosts.
    pub degraded_load: Vec<u32>,
    /// Whether each priority is in panic.
    pub panic: Vec<bool>,
}

/// Computes [`PriorityAssessment`]s.
#[derive(Debug, Clone, Copy)]
pub struct PriorityWeighting {
    overprovisioning_factor: u32,
    panic_threshold_percent: f64,
}

impl PriorityWeighting {
    /// Weighting with the thresholds from `config`.
    pub fn new(config: &LbConfig) -> Self {
        Self {
            overprovisioning_factor: config.overprovisioning_factor,
            panic_threshold_percent: config.panic_threshold_percent,
        }
    }

    fn availability(&self, count: usize, total: usize) -> u32 {
        if total == 0 {
            return 0;
        }
        let scaled = u64::from(self.overprovisioning_factor) * count as u64 / total as u64;
        scaled.min(100) as u32
    }

    fn in_panic(&self, host_set: &HostSet) -> bool {
        let total = host_set.hosts().len();
        let available = if total == 0 {
            0.0
        } else {
            let usable = host_set.healthy_hosts().len() + host_set.degraded_hosts().len();
            100.0 * usable as f64 / total as f64
        };
        available < self.panic_threshold_percent
    }

    /// Assess `host_sets`, indexed by priority.
    pub fn assess(&self, host_sets: &[Arc<HostSet>]) -> PriorityAssessment {
        let count = host_sets.len();
        let healthy_availability: Vec<u32> = host_sets
            .iter()
            .map(|hs| self.availability(hs.healthy_hosts().len(), hs.hosts().len()))
            .collect();
        let degraded_availability: Vec<u32> = host_sets
            .iter()
            .map(|hs| self.availability(hs.degraded_hosts().len(), hs.hosts().len()))
            .collect();

        let mut healthy_load = vec![0u32; count];
        let mut degraded_load = vec![0u32; count];

        let total_availability: u32 = healthy_availability
            .iter()
            .chain(degraded_availability.iter())
            .sum::<u32>()
            .min(100);

        if total_availability > 0 {
            let (first_healthy, remaining) =
                distribute(&mut healthy_load, &healthy_availability, 100, total_availability);
            let (first_degraded, remaining) = distribute(
                &mut degraded_load,
                &degraded_availability,
                remaining,
                total_availability,
            );
            if remaining > 0 {
                // Rounding residue.
                if let Some(index) = first_healthy {
                    healthy_load[index] += remaining;
                } else if let Some(index) = first_degraded {
                    degraded_load[index] += remaining;
                }
            }
        }

        let panic: Vec<bool> = host_sets
            .iter()
            .map(|hs| total_availability < 100 && self.in_panic(hs))
            .collect();

        if count > 0 && panic.iter().all(|p| *p) {
            distribute_by_host_count(host_sets, &mut healthy_load, &mut degraded_load);
        }

        PriorityAssessment {
            healthy_load,
            degraded_load,
            panic,
        }
    }
}

/// Hand out `total_load` in priority order, each priority taking its share of
/// `normalized_total`. Returns the first priority with any availability and the
/// load left over.
fn distribute(
    load: &mut [u32],
    availability: &[u32],
    mut total_load: u32,
    normalized_total: u32,
) -> (Option<usize>, u32) {
    let mut first_available = None;
    for (index, available) in availability.iter().enumerate() {
        if first_available.is_none() && *available > 0 {
            first_available = Some(index);
        }
        load[index] = total_load.min(available * 100 / normalized_total);
        total_load -= load[index];
    }
    (first_available, total_load)
}

/// Every priority is in panic: split traffic by raw host count.
fn distribute_by_host_count(
    host_sets: &[Arc<HostSet>],
    healthy_load: &mut [u32],
    degraded_load: &mut [u32],
) {
    degraded_load.iter_mut().for_each(|l| *l = 0);
    let total_hosts: usize = host_sets.iter().map(|hs| hs.hosts().len()).sum();
    if total_hosts == 0 {
        healthy_load.iter_mut().for_each(|l| *l = 0);
        healthy_load[0] = 100;
        return;
    }

    let mut remaining = 100u32;
    let mut first_non_empty = None;
    for (index, hs) in host_sets.iter().enumerate() {
        let hosts = hs.hosts().len();
        if first_non_empty.is_none() && hosts > 0 {
            first_non_empty = Some(index);
        }
        healthy_load[index] = (hosts * 100 / total_hosts) as u32;
        remaining -= healthy_load[index];
    }
    if let Some(index) = first_non_empty {
        healthy_load[index] += remaining;
    }
}

/// Map `hash` onto the cumulative load distributions.
///
/// The hash is reduced to a bucket in `1..=100`. Healthy load is consulted
/// first, then degraded load. If neither covers the bucket, priority 0 is used.
pub fn choose_priority(hash: u64, healthy_load: &[u32], degraded_load: &[u32]) -> (usize, HostAvailability) {
    let bucket = hash % 100 + 1;

    let mut aggregate = 0u64;
    for (priority, load) in healthy_load.iter().enumerate() {
        aggregate += u64::from(*load);
        if bucket <= aggregate {
            return (priority, HostAvailability::Healthy);
        }
    }
    for (priority, load) in degraded_load.iter().enumerate() {
        aggregate += u64::from(*load);
        if bucket <= aggregate {
            return (priority, HostAvailability::Degraded);
        }
    }
    (0, HostAvailability::Healthy)
}
