//! Thread-aware load balancing.
//!
//! The [`Coordinator`] rebuilds routing state on every membership change and
//! publishes it through the [`SnapshotPublisher`]. Each worker thread creates
//! its own [`WorkerSelector`] from the publisher and chooses hosts from that
//! snapshot without any further synchronization.

pub mod coordinator;
pub mod maglev;
pub mod priority;
pub mod publisher;
pub mod ring_hash;
pub mod selector;
pub mod snapshot;
pub mod stats;
pub mod worker;

pub use coordinator::Coordinator;
pub use publisher::SnapshotPublisher;
pub use selector::{SelectorFactory, SubordinateSelector};
pub use snapshot::{PriorityState, SharedSnapshot, Snapshot};
pub use stats::LbStats;
pub use worker::{HashKey, LoadBalancerContext, WorkerSelector};
