//! Lightweight Prometheus-compatible metrics for the mesh agent.
//!
//! Uses atomic counters for lock-free instrumentation. Rendered in
//! Prometheus text exposition format and logged on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lightweight Prometheus-compatible metrics for the mesh agent.
pub struct Metrics {
    /// Total reconciliation passes (counter)
    pub ticks_total: AtomicU64,
    /// Total peering decisions made (counter)
    pub decisions_total: AtomicU64,
    /// Total decisions that changed a peer's method (counter)
    pub method_changes_total: AtomicU64,
    /// Peers with no usable peering method in the last pass (gauge)
    pub unreachable_peers: AtomicU64,
    /// Peers in the cache after the last pass (gauge)
    pub peers: AtomicU64,
    /// Total snapshot read or parse failures (counter)
    pub snapshot_errors_total: AtomicU64,
    /// Total network rules handed to the host (counter)
    pub rules_applied_total: AtomicU64,
    /// Agent start time (for uptime calculation)
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            decisions_total: AtomicU64::new(0),
            method_changes_total: AtomicU64::new(0),
            unreachable_peers: AtomicU64::new(0),
            peers: AtomicU64::new(0),
            snapshot_errors_total: AtomicU64::new(0),
            rules_applied_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let uptime = self.start_time.elapsed().as_secs();
        format!(
            "# HELP mesh_agent_ticks_total Total reconciliation passes\n\
             # TYPE mesh_agent_ticks_total counter\n\
             mesh_agent_ticks_total {}\n\
             # HELP mesh_agent_decisions_total Total peering decisions\n\
             # TYPE mesh_agent_decisions_total counter\n\
             mesh_agent_decisions_total {}\n\
             # HELP mesh_agent_method_changes_total Total peering method changes\n\
             # TYPE mesh_agent_method_changes_total counter\n\
             mesh_agent_method_changes_total {}\n\
             # HELP mesh_agent_unreachable_peers Peers without a usable peering method\n\
             # TYPE mesh_agent_unreachable_peers gauge\n\
             mesh_agent_unreachable_peers {}\n\
             # HELP mesh_agent_peers Peers known to the agent\n\
             # TYPE mesh_agent_peers gauge\n\
             mesh_agent_peers {}\n\
             # HELP mesh_agent_snapshot_errors_total Total snapshot read or parse failures\n\
             # TYPE mesh_agent_snapshot_errors_total counter\n\
             mesh_agent_snapshot_errors_total {}\n\
             # HELP mesh_agent_rules_applied_total Total network rules applied\n\
             # TYPE mesh_agent_rules_applied_total counter\n\
             mesh_agent_rules_applied_total {}\n\
             # HELP mesh_agent_uptime_seconds Agent uptime in seconds\n\
             # TYPE mesh_agent_uptime_seconds gauge\n\
             mesh_agent_uptime_seconds {}\n",
            self.ticks_total.load(Ordering::Relaxed),
            self.decisions_total.load(Ordering::Relaxed),
            self.method_changes_total.load(Ordering::Relaxed),
            self.unreachable_peers.load(Ordering::Relaxed),
            self.peers.load(Ordering::Relaxed),
            self.snapshot_errors_total.load(Ordering::Relaxed),
            self.rules_applied_total.load(Ordering::Relaxed),
            uptime,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
