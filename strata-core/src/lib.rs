//! Strata Core functionality.
//!
//! This crate contains the host and priority models, the priority weighting
//! arithmetic, and the thread-aware load balancer that routes requests across
//! a changing set of upstream hosts.

pub mod config;
pub mod domain;
pub mod error;
pub mod load_balancer;

pub use config::{LbConfig, LbPolicy};
pub use error::{LbError, Result};
