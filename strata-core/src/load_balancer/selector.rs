//! Per-priority host selection capability.
//!
//! A [`SelectorFactory`] turns one priority's [`HostSet`] into an immutable
//! [`SubordinateSelector`]. Building may be expensive (ring or table
//! construction), so it only happens when routing state is refreshed. Selection
//! is a cheap, deterministic lookup by hash.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;

use crate::domain::host::SharedHost;
use crate::domain::priority_set::HostSet;
use crate::error::Result;

/// Chooses a host for a hash value.
///
/// Implementations are immutable after construction and must return the same
/// host for equal hashes on the same instance.
pub trait SubordinateSelector: fmt::Debug + Send + Sync {
    /// Host for `hash`, or `None` if the selector has no hosts.
    fn choose_host(&self, hash: u64) -> Option<SharedHost>;
}

/// Builds a [`SubordinateSelector`] for one priority.
pub trait SelectorFactory: Send + Sync {
    /// Short algorithm name for logs.
    fn name(&self) -> &'static str;

    /// Build a selector over the eligible hosts of `host_set`.
    ///
    /// `in_panic` widens eligibility to every host in the set.
    fn build(&self, host_set: &HostSet, in_panic: bool) -> Result<Box<dyn SubordinateSelector>>;
}

/// FNV-1a of `seed` (little endian) followed by `key`.
///
/// Stable across processes, platforms and toolchains, so every proxy instance
/// maps a key to the same ring or table position.
pub(crate) fn seeded_hash(key: &[u8], seed: u64) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(&seed.to_le_bytes());
    hasher.write(key);
    hasher.finish()
}

/// Weight of each host divided by the total weight, plus the smallest such share.
pub(crate) fn normalize_weights(hosts: &[SharedHost]) -> (Vec<(SharedHost, f64)>, f64) {
    let total: u64 = hosts.iter().map(|h| u64::from(h.weight())).sum();
    let mut min_weight = 1.0_f64;
    let normalized = hosts
        .iter()
        .map(|h| {
            let share = f64::from(h.weight()) / total as f64;
            min_weight = min_weight.min(share);
            (h.clone(), share)
        })
        .collect();
    (normalized, min_weight)
}
