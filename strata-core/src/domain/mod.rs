//! Domain models: upstream hosts and their grouping into priorities.

pub mod host;
pub mod priority_set;
