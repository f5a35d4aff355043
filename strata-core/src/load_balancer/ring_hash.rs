//! Weighted consistent hash ring.
//!
//! Each host is placed on the ring a number of times proportional to its
//! weight. A hash selects the first ring entry at or after it, wrapping around
//! to the start. Removing a host only remaps the keys that landed on it.

use std::fmt;

use tracing::trace;

use crate::config::RingHashConfig;
use crate::domain::host::SharedHost;
use crate::domain::priority_set::HostSet;
use crate::error::Result;
use crate::load_balancer::selector::{normalize_weights, seeded_hash, SelectorFactory, SubordinateSelector};

/// Builds [`RingHash`] selectors.
#[derive(Debug, Clone)]
pub struct RingHashFactory {
    config: RingHashConfig,
}

impl RingHashFactory {
    /// Create a factory with the given ring bounds.
    pub fn new(config: RingHashConfig) -> Self {
        Self { config }
    }
}

impl SelectorFactory for RingHashFactory {
    fn name(&self) -> &'static str {
        "ring_hash"
    }

    fn build(&self, host_set: &HostSet, in_panic: bool) -> Result<Box<dyn SubordinateSelector>> {
        let ring = RingHash::build(host_set.hosts_for_selection(in_panic), self.config)?;
        trace!(
            priority = host_set.priority(),
            in_panic,
            ring_size = ring.len(),
            "ring hash built"
        );
        Ok(Box::new(ring))
    }
}

struct RingEntry {
    hash: u64,
    host: SharedHost,
}

/// A sorted ring of `(hash, host)` entries.
pub struct RingHash {
    ring: Vec<RingEntry>,
}

impl fmt::Debug for RingHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingHash")
            .field("ring_size", &self.ring.len())
            .finish()
    }
}

impl RingHash {
    /// Build a ring over `hosts`.
    ///
    /// The ring gets enough entries that the lightest host appears at least
    /// `min_ring_size * its share` times, capped at `max_ring_size`.
    pub fn build(hosts: &[SharedHost], config: RingHashConfig) -> Result<Self> {
        config.validate()?;
        let RingHashConfig {
            min_ring_size,
            max_ring_size,
        } = config;
        if hosts.is_empty() {
            return Ok(Self { ring: Vec::new() });
        }

        let (normalized, min_weight) = normalize_weights(hosts);
        let scale =
            ((min_weight * min_ring_size as f64).ceil() / min_weight).min(max_ring_size as f64);

        let mut ring = Vec::with_capacity(scale.ceil() as usize);
        let mut current_hashes = 0.0_f64;
        let mut target_hashes = 0.0_f64;
        for (host, weight) in &normalized {
            target_hashes += scale * weight;
            let mut replica = 0u64;
            while current_hashes < target_hashes {
                let key = format!("{}_{}", host.addr, replica);
                ring.push(RingEntry {
                    hash: seeded_hash(key.as_bytes(), 0),
                    host: host.clone(),
                });
                replica += 1;
                current_hashes += 1.0;
            }
        }
        ring.sort_unstable_by_key(|entry| entry.hash);

        Ok(Self { ring })
    }

    /// Number of ring entries.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring has no hosts.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl SubordinateSelector for RingHash {
    fn choose_host(&self, hash: u64) -> Option<SharedHost> {
        if self.ring.is_empty() {
            return None;
        }
        let index = self.ring.partition_point(|entry| entry.hash < hash);
        let entry = self.ring.get(index).unwrap_or(&self.ring[0]);
        Some(entry.host.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_RING_SIZE;
    use crate::domain::host::{Host, HostId};
    use crate::error::LbError;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn hosts(weights: &[u32]) -> Vec<SharedHost> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                Arc::new(Host::with_weight(
                    HostId(i as u32),
                    format!("10.1.0.{}:9000", i).parse().unwrap(),
                    *w,
                ))
            })
            .collect()
    }

    fn small() -> RingHashConfig {
        RingHashConfig {
            min_ring_size: 256,
            max_ring_size: 4096,
        }
    }

    #[test]
    fn test_empty_ring_returns_none() {
        let ring = RingHash::build(&[], small()).unwrap();
        assert!(ring.is_empty());
        assert!(ring.choose_host(42).is_none());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = RingHashConfig {
            min_ring_size: 10,
            max_ring_size: 5,
        };
        assert_eq!(
            RingHash::build(&hosts(&[1]), config).unwrap_err(),
            LbError::InvalidRingSize { min: 10, max: 5 }
        );
        let config = RingHashConfig {
            min_ring_size: 0,
            max_ring_size: 5,
        };
        assert!(RingHash::build(&hosts(&[1]), config).is_err());
    }

    #[test]
    fn test_oversized_ring_rejected_before_allocating() {
        let config = RingHashConfig {
            min_ring_size: u64::MAX,
            max_ring_size: u64::MAX,
        };
        assert!(matches!(
            RingHash::build(&hosts(&[1, 1]), config),
            Err(LbError::InvalidRingSize { .. })
        ));
        let config = RingHashConfig {
            min_ring_size: 1024,
            max_ring_size: MAX_RING_SIZE + 1,
        };
        assert!(RingHash::build(&hosts(&[1]), config).is_err());
    }

    #[test]
    fn test_ring_size_respects_bounds() {
        let ring = RingHash::build(&hosts(&[1, 1, 1, 1]), small()).unwrap();
        assert!(ring.len() >= 256);
        assert!(ring.len() <= 4096 + 4);
    }

    #[test]
    fn test_wraps_past_last_entry() {
        let hosts = hosts(&[1, 1]);
        let ring = RingHash::build(&hosts, small()).unwrap();
        let first = ring.ring[0].host.id;
        assert_eq!(ring.choose_host(u64::MAX).map(|h| h.id), Some(first));
        assert_eq!(ring.choose_host(0).map(|h| h.id), Some(first));
    }

    #[test]
    fn test_weighted_distribution() {
        let hosts = hosts(&[1, 3]);
        let ring = RingHash::build(&hosts, small()).unwrap();
        let entries_for_heavy = ring.ring.iter().filter(|e| e.host.id == HostId(1)).count();
        let share = entries_for_heavy as f64 / ring.len() as f64;
        assert!((0.7..0.8).contains(&share), "heavy share was {}", share);
    }

    #[test]
    fn test_removing_host_only_remaps_its_keys() {
        let all = hosts(&[1, 1, 1, 1]);
        let before = RingHash::build(&all, small()).unwrap();
        let after = RingHash::build(&all[..3], small()).unwrap();

        for i in 0..2000u64 {
            let hash = seeded_hash(&i.to_le_bytes(), 7);
            let old = before.choose_host(hash).unwrap().id;
            let new = after.choose_host(hash).unwrap().id;
            if old != HostId(3) {
                assert_eq!(old, new);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_same_hash_same_host(hash in any::<u64>()) {
            let ring = RingHash::build(&hosts(&[1, 2, 3]), small()).unwrap();
            let a = ring.choose_host(hash).unwrap();
            let b = ring.choose_host(hash).unwrap();
            prop_assert_eq!(a.id, b.id);
        }
    }
}
