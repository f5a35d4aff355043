//! Upstream host models.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A unique identifier for an upstream host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u32);

/// Health classification of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HealthStatus {
    /// Serving normally.
    Healthy = 0,
    /// Serving, but should only receive traffic once healthy capacity runs out.
    Degraded = 1,
    /// Not serving.
    Unhealthy = 2,
}

impl HealthStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// A single upstream host.
///
/// Health is stored atomically so the health checker can flip it from any
/// thread. Routing never reads it directly; it reads the classification
/// captured in a [`HostSet`](crate::domain::priority_set::HostSet).
#[derive(Debug)]
pub struct Host {
    /// The unique ID of the host
    pub id: HostId,
    /// The socket address of the host
    pub addr: SocketAddr,
    weight: u32,
    health: AtomicU8,
}

impl Host {
    /// Create a healthy host with weight 1.
    pub fn new(id: HostId, addr: SocketAddr) -> Self {
        Self::with_weight(id, addr, 1)
    }

    /// Create a healthy host with the given weight. A weight of zero is raised to one.
    pub fn with_weight(id: HostId, addr: SocketAddr, weight: u32) -> Self {
        Self {
            id,
            addr,
            weight: weight.max(1),
            health: AtomicU8::new(HealthStatus::Healthy as u8),
        }
    }

    /// Relative weight used by the hashing selectors.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Current health classification.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_u8(self.health.load(Ordering::Acquire))
    }

    /// Check if the host is marked healthy
    pub fn is_healthy(&self) -> bool {
        self.health() == HealthStatus::Healthy
    }

    /// Update the health of the host, returning the previous value.
    pub fn set_health(&self, status: HealthStatus) -> HealthStatus {
        HealthStatus::from_u8(self.health.swap(status as u8, Ordering::AcqRel))
    }
}

/// A thread-safe reference to a Host.
pub type SharedHost = Arc<Host>;
