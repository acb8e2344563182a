//! One reconciliation pass over the mesh
//!
//! Each pass refreshes the peer cache from a snapshot, drops departed
//! peers, feeds health results to the engine and decides every peer. The
//! resulting decisions stand in for tunnel configuration and are logged
//! whenever they change.
//!
//! A peer that has never been healthy has no grace period. It moves to the
//! next candidate on every pass until a probe succeeds, so expect a
//! "Configuring peer" line per tick for such peers.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

use peering_engine::{Decision, PeerCache, PeeringEngine, ProxyRule, RefreshOutcome, RuleTable};

use crate::metrics::Metrics;
use crate::snapshot::Snapshot;

pub struct Reconciler {
    engine: PeeringEngine,
    cache: PeerCache,
    rules: RuleTable,
    /// Last decision handed to tunnel configuration, per device
    applied: HashMap<String, Decision>,
    metrics: Metrics,
}

impl Reconciler {
    pub fn new(engine: PeeringEngine, rules: Vec<ProxyRule>) -> Self {
        let mut table = RuleTable::new();
        for rule in rules {
            table.insert(rule);
        }

        Reconciler {
            engine,
            cache: PeerCache::new(),
            rules: table,
            applied: HashMap::new(),
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cache(&self) -> &PeerCache {
        &self.cache
    }

    /// Decide every peer in the snapshot
    ///
    /// Returns the devices whose decision changed in this pass.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot, now: Instant) -> Vec<String> {
        self.metrics.ticks_total.fetch_add(1, Ordering::Relaxed);

        for id in self.cache.retain_ids(|id| snapshot.peers.contains_key(id)) {
            if self.applied.remove(&id).is_some() {
                log::info!("Unconfiguring departed peer {}", id);
            }
        }

        let mut changed = Vec::new();
        let mut unreachable = 0;

        for (id, peer) in &snapshot.peers {
            if self.cache.refresh(id, peer.record.clone()) == RefreshOutcome::Reset {
                self.applied.remove(id);
            }

            let Some(entry) = self.cache.get_mut(id) else {
                continue;
            };
            self.engine.observe_health(entry, peer.healthy, now);
            let decision = self.engine.decide(entry, snapshot.relay_healthy, now);
            self.metrics.decisions_total.fetch_add(1, Ordering::Relaxed);

            if decision.is_unreachable() {
                unreachable += 1;
            }

            if self.applied.get(id) != Some(&decision) {
                if decision.is_unreachable() {
                    log::warn!("No peering method for {}, leaving unconfigured", id);
                } else {
                    log::info!("Configuring peer {}: {}", id, decision);
                }
                if self.applied.get(id).map(|d| d.method) != Some(decision.method) {
                    self.metrics.method_changes_total.fetch_add(1, Ordering::Relaxed);
                }
                self.applied.insert(id.clone(), decision);
                changed.push(id.clone());
            }
        }

        self.metrics.unreachable_peers.store(unreachable, Ordering::Relaxed);
        self.metrics
            .peers
            .store(self.cache.len() as u64, Ordering::Relaxed);

        changed.sort();
        changed
    }

    /// Hand pending rules to the host and mark them applied
    ///
    /// Returns the invocation arguments of the rules applied in this pass.
    pub fn reconcile_rules(&mut self) -> Vec<String> {
        let pending: Vec<_> = self
            .rules
            .pending()
            .map(|r| (r.key(), r.as_invocation_argument()))
            .collect();

        for (key, argument) in &pending {
            log::info!("Applying network rule {}", argument);
            self.rules.mark_stored(key);
            self.metrics.rules_applied_total.fetch_add(1, Ordering::Relaxed);
        }

        pending.into_iter().map(|(_, argument)| argument).collect()
    }

    /// Invocation arguments for the whole desired rule set, in key order
    pub fn rule_arguments(&self) -> Vec<String> {
        self.rules.invocation_arguments()
    }

    /// Last decision applied for a device
    pub fn decision(&self, device_id: &str) -> Option<&Decision> {
        self.applied.get(device_id)
    }

    /// Record a failed snapshot read
    pub fn snapshot_failed(&self) {
        self.metrics.snapshot_errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use peering_engine::{
        parse_rule, LocalPosture, PeeringMethod, RuleDirection, PEERING_RESTORE_TIMEOUT,
    };

    fn snapshot(relay_healthy: bool, healthy: bool) -> Snapshot {
        Snapshot::from_json(&format!(
            r#"{{
                "relay_healthy": {},
                "peers": {{
                    "device-a": {{
                        "endpoints": [
                            {{"address": "192.168.10.50:5678", "source": "local"}},
                            {{"address": "1.1.1.1:4321", "source": "stun"}}
                        ],
                        "public_key": "bacon",
                        "healthy": {}
                    }},
                    "device-b": {{
                        "endpoints": [{{"address": "2.2.2.2:4321", "source": "stun"}}],
                        "public_key": "eggs",
                        "symmetric_nat": true,
                        "healthy": {}
                    }}
                }}
            }}"#,
            relay_healthy, healthy, healthy
        ))
        .unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(PeeringEngine::new(LocalPosture::new("1.1.1.1:1234")), Vec::new())
    }

    #[test]
    fn test_first_pass_configures_every_peer() {
        let mut r = reconciler();
        let changed = r.apply_snapshot(&snapshot(false, false), Instant::now());

        assert_eq!(changed, vec!["device-a".to_string(), "device-b".to_string()]);
        assert_eq!(r.decision("device-a").unwrap().method, PeeringMethod::DirectLocal);
        assert!(r.decision("device-b").unwrap().is_unreachable());
        assert_eq!(r.metrics().unreachable_peers.load(Ordering::Relaxed), 1);
        assert_eq!(r.metrics().peers.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_healthy_peers_are_left_alone() {
        let mut r = reconciler();
        let now = Instant::now();
        r.apply_snapshot(&snapshot(true, true), now);

        let changed = r.apply_snapshot(&snapshot(true, true), now + Duration::from_secs(600));
        assert!(changed.is_empty());
        assert_eq!(r.metrics().ticks_total.load(Ordering::Relaxed), 2);
        assert_eq!(r.metrics().decisions_total.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_unhealthy_peer_is_demoted_after_timeout() {
        let mut r = reconciler();
        let now = Instant::now();
        r.apply_snapshot(&snapshot(false, true), now);

        let grace = r.apply_snapshot(&snapshot(false, false), now + Duration::from_secs(60));
        assert!(grace.is_empty());

        let later = now + PEERING_RESTORE_TIMEOUT + Duration::from_secs(1);
        let changed = r.apply_snapshot(&snapshot(false, false), later);
        assert_eq!(changed, vec!["device-a".to_string()]);
        assert_eq!(r.decision("device-a").unwrap().method, PeeringMethod::Reflexive);
    }

    #[test]
    fn test_never_healthy_peer_rotates_every_pass() {
        let mut r = reconciler();
        let now = Instant::now();

        let methods: Vec<PeeringMethod> = (0..4)
            .map(|tick| {
                let at = now + Duration::from_secs(tick * 10);
                let changed = r.apply_snapshot(&snapshot(false, false), at);
                assert!(changed.contains(&"device-a".to_string()));
                r.decision("device-a").unwrap().method
            })
            .collect();

        assert_eq!(
            methods,
            vec![
                PeeringMethod::DirectLocal,
                PeeringMethod::Reflexive,
                PeeringMethod::DirectLocal,
                PeeringMethod::Reflexive,
            ]
        );
    }

    #[test]
    fn test_departed_peer_is_removed() {
        let mut r = reconciler();
        let now = Instant::now();
        r.apply_snapshot(&snapshot(false, false), now);

        let mut smaller = snapshot(false, false);
        smaller.peers.remove("device-b");
        r.apply_snapshot(&smaller, now);

        assert!(r.decision("device-b").is_none());
        assert!(r.cache().get("device-b").is_none());
        assert_eq!(r.cache().len(), 1);
    }

    #[test]
    fn test_rules_applied_once() {
        let rules = vec![
            parse_rule("tcp:443:10.0.0.5:8443", RuleDirection::Ingress).unwrap(),
            parse_rule("tcp:443:10.0.0.6:8443", RuleDirection::Ingress).unwrap(),
            parse_rule("udp:53:10.0.0.53:53", RuleDirection::Egress).unwrap(),
        ];
        let mut r = Reconciler::new(PeeringEngine::new(LocalPosture::new("1.1.1.1:1234")), rules);

        // Later rule with the same key wins
        assert_eq!(
            r.reconcile_rules(),
            vec![
                "--egress udp:53:10.0.0.53:53".to_string(),
                "--ingress tcp:443:10.0.0.6:8443".to_string(),
            ]
        );
        assert!(r.reconcile_rules().is_empty());
        assert_eq!(r.rule_arguments().len(), 2);
        assert_eq!(r.metrics().rules_applied_total.load(Ordering::Relaxed), 2);
    }
}
