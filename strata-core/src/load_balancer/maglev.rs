//! Maglev lookup table selector.
//!
//! Every host derives a permutation of table slots from two hashes of its
//! address. Hosts take turns claiming their next free slot, heavier hosts
//! taking turns more often, until the table is full. Selection is a single
//! index into the table.

use std::fmt;

use tracing::trace;

use crate::config::MaglevConfig;
use crate::domain::host::SharedHost;
use crate::domain::priority_set::HostSet;
use crate::error::{LbError, Result};
use crate::load_balancer::selector::{normalize_weights, seeded_hash, SelectorFactory, SubordinateSelector};

/// Builds [`Maglev`] selectors.
#[derive(Debug, Clone)]
pub struct MaglevFactory {
    config: MaglevConfig,
}

impl MaglevFactory {
    /// Create a factory with the given table size.
    pub fn new(config: MaglevConfig) -> Self {
        Self { config }
    }
}

impl SelectorFactory for MaglevFactory {
    fn name(&self) -> &'static str {
        "maglev"
    }

    fn build(&self, host_set: &HostSet, in_panic: bool) -> Result<Box<dyn SubordinateSelector>> {
        let table = Maglev::build(host_set.hosts_for_selection(in_panic), self.config)?;
        trace!(
            priority = host_set.priority(),
            in_panic,
            table_size = table.len(),
            "maglev table built"
        );
        Ok(Box::new(table))
    }
}

struct BuildEntry {
    host: SharedHost,
    offset: u64,
    skip: u64,
    weight: f64,
    target_weight: f64,
    next: u64,
}

impl BuildEntry {
    fn permutation(&self, table_size: u64) -> usize {
        let slot = (u128::from(self.offset) + u128::from(self.skip) * u128::from(self.next))
            % u128::from(table_size);
        slot as usize
    }
}

/// A fully populated Maglev lookup table.
pub struct Maglev {
    table: Vec<SharedHost>,
}

impl fmt::Debug for Maglev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maglev")
            .field("table_size", &self.table.len())
            .finish()
    }
}

pub(crate) fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut divisor = 2u64;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 1;
    }
    true
}

impl Maglev {
    /// Build a table over `hosts`.
    pub fn build(hosts: &[SharedHost], config: MaglevConfig) -> Result<Self> {
        config.validate()?;
        let table_size = config.table_size;
        if hosts.len() as u64 > table_size {
            return Err(LbError::TableTooSmall {
                hosts: hosts.len(),
                table_size,
            });
        }
        if hosts.is_empty() {
            return Ok(Self { table: Vec::new() });
        }

        let (normalized, _) = normalize_weights(hosts);
        let max_weight = normalized.iter().map(|(_, w)| *w).fold(0.0_f64, f64::max);
        let mut entries: Vec<BuildEntry> = normalized
            .into_iter()
            .map(|(host, weight)| {
                let key = host.addr.to_string();
                BuildEntry {
                    offset: seeded_hash(key.as_bytes(), 0) % table_size,
                    skip: seeded_hash(key.as_bytes(), 1) % (table_size - 1) + 1,
                    weight,
                    target_weight: 0.0,
                    next: 0,
                    host,
                }
            })
            .collect();

        let mut slots: Vec<Option<SharedHost>> = vec![None; table_size as usize];
        let mut filled = 0u64;
        let mut iteration = 1u64;
        while filled < table_size {
            for entry in entries.iter_mut() {
                if filled == table_size {
                    break;
                }
                // A host at max weight claims a slot every turn; lighter hosts skip turns.
                if iteration as f64 * entry.weight < entry.target_weight {
                    continue;
                }
                entry.target_weight += max_weight;

                let mut slot = entry.permutation(table_size);
                while slots[slot].is_some() {
                    entry.next += 1;
                    slot = entry.permutation(table_size);
                }
                slots[slot] = Some(entry.host.clone());
                entry.next += 1;
                filled += 1;
            }
            iteration += 1;
        }

        Ok(Self {
            table: slots.into_iter().flatten().collect(),
        })
    }

    /// Number of table slots, zero when there are no hosts.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table has no hosts.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl SubordinateSelector for Maglev {
    fn choose_host(&self, hash: u64) -> Option<SharedHost> {
        if self.table.is_empty() {
            return None;
        }
        let index = (hash % self.table.len() as u64) as usize;
        Some(self.table[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::{Host, HostId};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn hosts(weights: &[u32]) -> Vec<SharedHost> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                Arc::new(Host::with_weight(
                    HostId(i as u32),
                    format!("10.2.0.{}:9000", i).parse().unwrap(),
                    *w,
                ))
            })
            .collect()
    }

    fn count(table: &Maglev, id: u32) -> usize {
        table.table.iter().filter(|h| h.id == HostId(id)).count()
    }

    #[test]
    fn test_is_prime() {
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(is_prime(2));
        assert!(is_prime(251));
        assert!(is_prime(65537));
        assert!(!is_prime(65536));
    }

    #[test]
    fn test_rejects_non_prime_table() {
        let err = Maglev::build(&hosts(&[1]), MaglevConfig { table_size: 100 }).unwrap_err();
        assert_eq!(err, LbError::TableSizeNotPrime(100));
    }

    #[test]
    fn test_rejects_oversized_table_before_allocating() {
        // Largest prime below 2^64.
        let config = MaglevConfig {
            table_size: 18_446_744_073_709_551_557,
        };
        assert!(matches!(
            Maglev::build(&hosts(&[1]), config),
            Err(LbError::TableSizeTooLarge { .. })
        ));
    }

    #[test]
    fn test_rejects_more_hosts_than_slots() {
        let err = Maglev::build(&hosts(&[1; 9]), MaglevConfig { table_size: 7 }).unwrap_err();
        assert_eq!(
            err,
            LbError::TableTooSmall {
                hosts: 9,
                table_size: 7
            }
        );
    }

    #[test]
    fn test_empty_table_returns_none() {
        let table = Maglev::build(&[], MaglevConfig { table_size: 251 }).unwrap();
        assert!(table.is_empty());
        assert!(table.choose_host(1).is_none());
    }

    #[test]
    fn test_table_is_full_and_balanced() {
        let table = Maglev::build(&hosts(&[1, 1]), MaglevConfig { table_size: 251 }).unwrap();
        assert_eq!(table.len(), 251);
        let a = count(&table, 0);
        let b = count(&table, 1);
        assert_eq!(a + b, 251);
        assert!(a.abs_diff(b) <= 1);
    }

    #[test]
    fn test_weighted_table() {
        let table = Maglev::build(&hosts(&[1, 3]), MaglevConfig { table_size: 251 }).unwrap();
        let heavy = count(&table, 1) as f64 / 251.0;
        assert!((0.7..0.8).contains(&heavy), "heavy share was {}", heavy);
    }

    proptest! {
        #[test]
        fn prop_same_hash_same_host(hash in any::<u64>()) {
            let table = Maglev::build(&hosts(&[1, 2, 5]), MaglevConfig { table_size: 251 }).unwrap();
            prop_assert_eq!(table.choose_host(hash).unwrap().id, table.choose_host(hash).unwrap().id);
        }
    }
}
