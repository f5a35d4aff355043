//! Strata Health
//!
//! Active health checking for upstream hosts. Probe results are written back
//! into the [`PrioritySet`](strata_core::domain::priority_set::PrioritySet),
//! whose listeners (the load balancer coordinator) rebuild routing state.

pub mod prober;

pub use prober::{probe_once, spawn_health_checker, ProberConfig};
