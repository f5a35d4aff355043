//! Error types for the load balancing engine.

use thiserror::Error;

/// Errors raised while building routing state.
///
/// None of these ever reach the per-request path: a failed refresh leaves the
/// previously published snapshot in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LbError {
    /// The ring hash size bounds are unusable.
    #[error("invalid ring size bounds: min {min}, max {max}")]
    InvalidRingSize {
        /// Configured minimum ring size.
        min: u64,
        /// Configured maximum ring size.
        max: u64,
    },

    /// Maglev lookup tables must have a prime number of slots.
    #[error("maglev table size {0} is not prime")]
    TableSizeNotPrime(u64),

    /// The Maglev table would exceed the allowed size.
    #[error("maglev table size {table_size} exceeds the limit of {max}")]
    TableSizeTooLarge {
        /// Configured table size.
        table_size: u64,
        /// Largest accepted table size.
        max: u64,
    },

    /// More hosts than the Maglev table can hold.
    #[error("maglev table of {table_size} slots cannot hold {hosts} hosts")]
    TableTooSmall {
        /// Number of hosts handed to the build.
        hosts: usize,
        /// Configured table size.
        table_size: u64,
    },

    /// The parallel per-priority sequences of a snapshot disagree in length.
    #[error(
        "inconsistent snapshot: {states} priority states, {healthy} healthy loads, {degraded} degraded loads"
    )]
    InconsistentSnapshot {
        /// Number of priority states.
        states: usize,
        /// Length of the healthy load distribution.
        healthy: usize,
        /// Length of the degraded load distribution.
        degraded: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LbError>;
