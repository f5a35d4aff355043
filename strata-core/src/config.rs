//! Load balancer configuration.
//!
//! These types only derive serde; reading them from disk is left to the
//! embedding process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LbError, Result};
use crate::load_balancer::maglev::{is_prime, MaglevFactory};
use crate::load_balancer::ring_hash::RingHashFactory;
use crate::load_balancer::selector::SelectorFactory;

/// Largest ring hash size accepted.
pub const MAX_RING_SIZE: u64 = 8 * 1024 * 1024;

/// Largest Maglev table size accepted.
pub const MAX_TABLE_SIZE: u64 = 5_000_011;

/// Which subordinate selection algorithm each priority uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    /// Weighted consistent hash ring.
    #[default]
    RingHash,
    /// Maglev lookup table.
    Maglev,
}

/// Top level load balancer settings for one target group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbConfig {
    /// A priority whose healthy plus degraded share drops below this
    /// percentage enters panic and selects across all of its hosts.
    #[serde(default = "default_panic_threshold_percent")]
    pub panic_threshold_percent: f64,

    /// Overprovisioning factor in percent (140 means 1.4x).
    #[serde(default = "default_overprovisioning_factor")]
    pub overprovisioning_factor: u32,

    /// Selection algorithm.
    #[serde(default)]
    pub policy: LbPolicy,

    /// Ring hash settings, used when `policy` is `ring_hash`.
    #[serde(default)]
    pub ring_hash: RingHashConfig,

    /// Maglev settings, used when `policy` is `maglev`.
    #[serde(default)]
    pub maglev: MaglevConfig,
}

/// Ring hash bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingHashConfig {
    /// Lower bound on the number of ring entries.
    #[serde(default = "default_min_ring_size")]
    pub min_ring_size: u64,

    /// Upper bound on the number of ring entries.
    #[serde(default = "default_max_ring_size")]
    pub max_ring_size: u64,
}

/// Maglev table settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaglevConfig {
    /// Number of lookup table slots. Must be prime.
    #[serde(default = "default_table_size")]
    pub table_size: u64,
}

fn default_panic_threshold_percent() -> f64 {
    50.0
}

fn default_overprovisioning_factor() -> u32 {
    140
}

fn default_min_ring_size() -> u64 {
    1024
}

fn default_max_ring_size() -> u64 {
    MAX_RING_SIZE
}

fn default_table_size() -> u64 {
    65537
}

impl Default for LbConfig {
    fn default() -> Self {
        Self {
            panic_threshold_percent: default_panic_threshold_percent(),
            overprovisioning_factor: default_overprovisioning_factor(),
            policy: LbPolicy::default(),
            ring_hash: RingHashConfig::default(),
            maglev: MaglevConfig::default(),
        }
    }
}

impl Default for RingHashConfig {
    fn default() -> Self {
        Self {
            min_ring_size: default_min_ring_size(),
            max_ring_size: default_max_ring_size(),
        }
    }
}

impl Default for MaglevConfig {
    fn default() -> Self {
        Self {
            table_size: default_table_size(),
        }
    }
}

impl RingHashConfig {
    /// Require `1 <= min_ring_size <= max_ring_size <= MAX_RING_SIZE`.
    pub fn validate(&self) -> Result<()> {
        if self.min_ring_size == 0
            || self.min_ring_size > self.max_ring_size
            || self.max_ring_size > MAX_RING_SIZE
        {
            return Err(LbError::InvalidRingSize {
                min: self.min_ring_size,
                max: self.max_ring_size,
            });
        }
        Ok(())
    }
}

impl MaglevConfig {
    /// Require a prime table size no larger than `MAX_TABLE_SIZE`.
    pub fn validate(&self) -> Result<()> {
        if self.table_size > MAX_TABLE_SIZE {
            return Err(LbError::TableSizeTooLarge {
                table_size: self.table_size,
                max: MAX_TABLE_SIZE,
            });
        }
        if !is_prime(self.table_size) {
            return Err(LbError::TableSizeNotPrime(self.table_size));
        }
        Ok(())
    }
}

impl LbConfig {
    /// Check every bound the weighting arithmetic and the selectors rely on.
    ///
    /// The selectors repeat their own checks at build time, so a factory
    /// constructed around an unchecked config still fails the refresh instead
    /// of allocating an oversized ring or table.
    pub fn validate(&self) -> Result<()> {
        self.ring_hash.validate()?;
        self.maglev.validate()?;
        if !(0.0..=100.0).contains(&self.panic_threshold_percent) {
            return Err(LbError::InvalidConfig(format!(
                "panic_threshold_percent must be within [0, 100], got {}",
                self.panic_threshold_percent
            )));
        }
        if self.overprovisioning_factor == 0 {
            return Err(LbError::InvalidConfig(
                "overprovisioning_factor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the selector factory for the configured policy.
    pub fn selector_factory(&self) -> Arc<dyn SelectorFactory> {
        debug!(policy = ?self.policy, "building selector factory");
        match self.policy {
            LbPolicy::RingHash => Arc::new(RingHashFactory::new(self.ring_hash)),
            LbPolicy::Maglev => Arc::new(MaglevFactory::new(self.maglev)),
        }
    }
}
