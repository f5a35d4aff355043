//! Background prober for active TCP health checks.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use strata_core::domain::host::HealthStatus;
use strata_core::domain::priority_set::PrioritySet;

/// Prober timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProberConfig {
    /// Time between probe rounds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Connect timeout for a single probe.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    1500
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Probe every host in `priority_set` once.
///
/// A host that accepts a TCP connection within `timeout` is healthy, except
/// that a host already marked degraded stays degraded. Anything else is
/// unhealthy. If any host changed, the priority set is reclassified on the
/// blocking pool, since that notifies its listeners and rebuilds routing state.
/// Returns the number of hosts that changed.
pub async fn probe_once(priority_set: &Arc<PrioritySet>, timeout: Duration) -> usize {
    let host_sets = priority_set.host_sets();
    let mut changed = 0;

    for host_set in host_sets.iter() {
        for host in host_set.hosts() {
            let reachable = matches!(
                time::timeout(timeout, TcpStream::connect(host.addr)).await,
                Ok(Ok(_stream))
            );

            let was = host.health();
            let now = match (reachable, was) {
                (true, HealthStatus::Degraded) => HealthStatus::Degraded,
                (true, _) => HealthStatus::Healthy,
                (false, _) => HealthStatus::Unhealthy,
            };

            if now != was {
                info!(
                    host = host.id.0,
                    addr = %host.addr,
                    priority = host_set.priority(),
                    from = ?was,
                    to = ?now,
                    "host health changed"
                );
                host.set_health(now);
                changed += 1;
            }
        }
    }

    if changed > 0 {
        let set = Arc::clone(priority_set);
        match tokio::task::spawn_blocking(move || set.recompute_health()).await {
            Ok(priorities) => debug!(hosts = changed, priorities, "health changes applied"),
            Err(e) => warn!(error = %e, "health reclassification task failed"),
        }
    }
    changed
}

/// Spawns a background Tokio task that periodically probes every host in
/// `priority_set` and feeds health changes back into it.
pub fn spawn_health_checker(priority_set: Arc<PrioritySet>, config: ProberConfig) -> JoinHandle<()> {
    let check_interval = Duration::from_millis(config.interval_ms);
    let timeout = Duration::from_millis(config.timeout_ms);

    tokio::spawn(async move {
        let mut interval = time::interval(check_interval);

        // Prevent immediately ticking when spawned
        interval.tick().await;

        loop {
            interval.tick().await;
            probe_once(&priority_set, timeout).await;
        }
    })
}
