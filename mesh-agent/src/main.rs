//! Mesh Data-Plane Agent
//!
//! Periodically reconciles this node's view of the mesh:
//! - Refreshes the peer cache from the peer state snapshot
//! - Chooses a peering method for every peer (direct, reflexive or relay)
//! - Hands desired port-forwarding rules to the host once
//!
//! Runs until SIGTERM/SIGINT, or for a single pass with `--once`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use peering_engine::PeeringEngine;

mod config;
mod metrics;
mod reconcile;
mod snapshot;

use config::AgentConfig;
use reconcile::Reconciler;
use snapshot::Snapshot;

/// Granularity of the shutdown check while waiting for the next tick
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let config = AgentConfig::from_args(&args)?;

    log::info!("Mesh agent starting...");
    log::info!("  State:     {}", config.state_path.display());
    log::info!("  Reflexive: {}", config.posture.reflexive_address);
    log::info!("  Relay:     {}", config.posture.relay);
    log::info!("  Sym NAT:   {}", config.posture.symmetric_nat);
    log::info!("  Interval:  {:?}", config.interval);
    log::info!("  Rules:     {}", config.rules.len());

    // SIGTERM/SIGINT request a graceful stop after the current pass
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    let engine = PeeringEngine::new(config.posture.clone())
        .with_restore_timeout(config.restore_timeout);
    let mut reconciler = Reconciler::new(engine, config.rules.clone());
    for argument in reconciler.rule_arguments() {
        log::info!("  Rule:      {}", argument);
    }

    run(&config, &mut reconciler, &shutdown)?;

    log::info!("Mesh agent stopped\n{}", reconciler.metrics().render());
    Ok(())
}

fn run(
    config: &AgentConfig,
    reconciler: &mut Reconciler,
    shutdown: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match Snapshot::load(&config.state_path) {
            Ok(snapshot) => {
                let changed = reconciler.apply_snapshot(&snapshot, Instant::now());
                log::debug!(
                    "Reconciled {} peers ({} changed)",
                    reconciler.cache().len(),
                    changed.len()
                );
                for id in &changed {
                    if let Some(decision) = reconciler.decision(id) {
                        log::debug!("  {} -> {}", id, decision);
                    }
                }
            }
            // A single pass has nothing to fall back on
            Err(e) if config.once => return Err(e.into()),
            Err(e) => {
                log::warn!("Skipping pass: {}", e);
                reconciler.snapshot_failed();
            }
        }

        reconciler.reconcile_rules();

        if config.once || !wait_for_tick(config.interval, shutdown) {
            break;
        }
    }

    Ok(())
}

/// Sleep until the next tick; false if shutdown was requested meanwhile
fn wait_for_tick(interval: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            log::info!("Shutdown requested");
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}
