//! Peering method selection for mesh peers
//!
//! For every peer the engine builds an ordered list of candidate peering
//! methods from the local and remote roles, then applies hysteresis so a
//! working method is never abandoned and a broken one is retried before
//! being demoted.
//!
//! # Candidate Lists
//!
//! ```text
//! local / remote          candidates (priority order)
//! ───────────────────────────────────────────────────────────────────────
//! normal / normal         [direct-local]¹, reflexive, [via-relay]²
//! normal / relay          [relay-peer-direct-local]¹, relay-peer
//! relay / normal          [relay-self-direct-local]¹, relay-self
//! symmetric NAT³, no relay  direct-local¹ or none
//! symmetric NAT³, relay     via-relay
//!
//! ¹ only when both nodes share a public address
//! ² only when a relay is currently healthy
//! ³ either side behind symmetric NAT
//! ```
//!
//! # Hysteresis
//!
//! - Healthy peers keep their method.
//! - Unhealthy peers keep their method for `PEERING_RESTORE_TIMEOUT` after
//!   they were last healthy.
//! - After that, each decision advances one candidate. Lists ending in a
//!   dedicated relay hop stop at the relay; other lists wrap around.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointSource, LocalPosture};
use crate::peer::{PeerCacheEntry, PeerRecord};

// ============================================================================
// Constants
// ============================================================================

/// How long an unhealthy peer keeps its method before being demoted (3 minutes)
pub const PEERING_RESTORE_TIMEOUT: Duration = Duration::from_secs(180);

// ============================================================================
// Peering Method
// ============================================================================

/// How the tunnel to a peer is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeeringMethod {
    /// Peer's LAN address, both nodes behind the same public address
    DirectLocal,
    /// Peer's reflexive (public) address
    Reflexive,
    /// Through a dedicated relay node
    ViaRelay,
    /// Remote peer is a relay, reached on its LAN address
    RelayPeerDirectLocal,
    /// Remote peer is a relay, reached on its reflexive address
    RelayPeer,
    /// We are the relay, peer reached on its LAN address
    RelaySelfDirectLocal,
    /// We are the relay, peer reached on its reflexive address
    RelaySelf,
    /// No usable method; leave the peer unconfigured
    None,
}

impl PeeringMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeeringMethod::DirectLocal => "direct-local",
            PeeringMethod::Reflexive => "reflexive",
            PeeringMethod::ViaRelay => "via-relay",
            PeeringMethod::RelayPeerDirectLocal => "relay-peer-direct-local",
            PeeringMethod::RelayPeer => "relay-peer",
            PeeringMethod::RelaySelfDirectLocal => "relay-self-direct-local",
            PeeringMethod::RelaySelf => "relay-self",
            PeeringMethod::None => "none",
        }
    }

    /// Which of the peer's endpoints the tunnel should point at
    ///
    /// `None` for methods that configure no peer endpoint: via-relay
    /// (traffic rides the relay's tunnel) and none.
    pub fn destination_source(&self) -> Option<EndpointSource> {
        match self {
            PeeringMethod::DirectLocal
            | PeeringMethod::RelayPeerDirectLocal
            | PeeringMethod::RelaySelfDirectLocal => Some(EndpointSource::Local),
            PeeringMethod::Reflexive | PeeringMethod::RelayPeer | PeeringMethod::RelaySelf => {
                Some(EndpointSource::Reflexive)
            }
            PeeringMethod::ViaRelay | PeeringMethod::None => None,
        }
    }

    /// Whether this is a hop through a dedicated relay node
    ///
    /// Relay-peer and relay-self are direct tunnels to or from a relay and
    /// do not count.
    pub fn is_via_relay(&self) -> bool {
        matches!(self, PeeringMethod::ViaRelay)
    }

    /// Whether this method uses the peer's LAN address
    pub fn is_direct_local(&self) -> bool {
        self.destination_source() == Some(EndpointSource::Local)
    }
}

impl fmt::Display for PeeringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Scenario
// ============================================================================

/// Role combination of the local node and a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Neither side is a relay or behind symmetric NAT
    Normal,
    /// The remote peer is a relay
    RemoteIsRelay,
    /// The local node is a relay
    LocalIsRelay,
    /// Symmetric NAT on either side and no healthy relay
    SymmetricNat,
    /// Symmetric NAT on either side with a healthy relay
    SymmetricNatWithRelay,
}

impl Scenario {
    /// Classify the roles; relay roles take precedence over NAT posture
    pub fn classify(posture: &LocalPosture, record: &PeerRecord, relay_healthy: bool) -> Self {
        if posture.relay {
            Scenario::LocalIsRelay
        } else if record.relay {
            Scenario::RemoteIsRelay
        } else if posture.symmetric_nat || record.symmetric_nat {
            if relay_healthy {
                Scenario::SymmetricNatWithRelay
            } else {
                Scenario::SymmetricNat
            }
        } else {
            Scenario::Normal
        }
    }

    /// Methods to try in priority order, before feasibility filtering
    fn methods(&self, same_network: bool, relay_healthy: bool) -> Vec<PeeringMethod> {
        let mut methods = Vec::with_capacity(3);
        match self {
            Scenario::Normal => {
                if same_network {
                    methods.push(PeeringMethod::DirectLocal);
                }
                methods.push(PeeringMethod::Reflexive);
                if relay_healthy {
                    methods.push(PeeringMethod::ViaRelay);
                }
            }
            Scenario::RemoteIsRelay => {
                if same_network {
                    methods.push(PeeringMethod::RelayPeerDirectLocal);
                }
                methods.push(PeeringMethod::RelayPeer);
            }
            Scenario::LocalIsRelay => {
                if same_network {
                    methods.push(PeeringMethod::RelaySelfDirectLocal);
                }
                methods.push(PeeringMethod::RelaySelf);
            }
            Scenario::SymmetricNat => {
                if same_network {
                    methods.push(PeeringMethod::DirectLocal);
                }
            }
            Scenario::SymmetricNatWithRelay => methods.push(PeeringMethod::ViaRelay),
        }
        methods
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// A feasible peering method together with its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub method: PeeringMethod,
    /// Peer endpoint to configure, if the method uses one
    pub destination: Option<String>,
}

impl Candidate {
    fn none() -> Self {
        Self {
            method: PeeringMethod::None,
            destination: None,
        }
    }
}

/// Resolve a method against the peer record
///
/// Returns `None` when the method needs an endpoint the peer lacks.
fn resolve(method: PeeringMethod, record: &PeerRecord) -> Option<Candidate> {
    let destination = match method.destination_source() {
        Some(source) => Some(record.address(source)?.to_string()),
        None => None,
    };
    Some(Candidate {
        method,
        destination,
    })
}

/// Build the ordered candidate list for a peer
///
/// Never empty: if no method is feasible the list is `[none]`.
pub fn candidate_list(
    posture: &LocalPosture,
    record: &PeerRecord,
    relay_healthy: bool,
) -> Vec<Candidate> {
    let same_network = record
        .reflexive_address()
        .map_or(false, |addr| posture.shares_public_network(addr));

    let mut candidates: Vec<Candidate> = Scenario::classify(posture, record, relay_healthy)
        .methods(same_network, relay_healthy)
        .into_iter()
        .filter_map(|method| resolve(method, record))
        .collect();

    if candidates.is_empty() {
        candidates.push(Candidate::none());
    }
    candidates
}

/// Next candidate index when demoting
///
/// Starts at 0 for undecided peers. Lists ending in a dedicated relay hop
/// clamp at the relay, every other list wraps.
fn next_index(current: Option<usize>, len: usize, clamp: bool) -> usize {
    match current {
        None => 0,
        Some(index) if clamp => (index + 1).min(len - 1),
        Some(index) => (index + 1) % len,
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Result of a peering decision, consumed by tunnel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Peer endpoint to point the tunnel at
    pub destination: Option<String>,
    pub method: PeeringMethod,
    /// Index of `method` in the current candidate list
    pub index: usize,
}

impl Decision {
    /// Whether the tunnel needs a peer endpoint configured
    pub fn configures_endpoint(&self) -> bool {
        self.destination.is_some()
    }

    /// Whether the peer should be left unconfigured for now
    pub fn is_unreachable(&self) -> bool {
        self.method == PeeringMethod::None
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            Some(dest) => write!(f, "{} to {} (candidate {})", self.method, dest, self.index),
            None => write!(f, "{} (candidate {})", self.method, self.index),
        }
    }
}

// ============================================================================
// Peering Engine
// ============================================================================

/// Chooses and maintains the peering method for each peer
///
/// Holds only the local posture and the hysteresis timeout; all per-peer
/// state lives in the [`PeerCacheEntry`] passed to each call.
#[derive(Debug, Clone)]
pub struct PeeringEngine {
    posture: LocalPosture,
    restore_timeout: Duration,
}

impl PeeringEngine {
    pub fn new(posture: LocalPosture) -> Self {
        Self {
            posture,
            restore_timeout: PEERING_RESTORE_TIMEOUT,
        }
    }

    /// Override the hysteresis timeout
    pub fn with_restore_timeout(mut self, restore_timeout: Duration) -> Self {
        self.restore_timeout = restore_timeout;
        self
    }

    pub fn posture(&self) -> &LocalPosture {
        &self.posture
    }

    /// Replace the local posture after it was redetected
    pub fn set_posture(&mut self, posture: LocalPosture) {
        if posture != self.posture {
            log::info!(
                "Local posture changed: reflexive={} relay={} symmetric_nat={}",
                posture.reflexive_address,
                posture.relay,
                posture.symmetric_nat
            );
        }
        self.posture = posture;
    }

    pub fn restore_timeout(&self) -> Duration {
        self.restore_timeout
    }

    /// Return a peer to the undecided state
    pub fn reset_peer_state(&self, entry: &mut PeerCacheEntry) {
        log::debug!("Resetting peering state for key={}", entry.record.public_key);
        entry.state.reset();
    }

    /// Record a health probe result for a peer
    pub fn observe_health(&self, entry: &mut PeerCacheEntry, healthy: bool, now: Instant) {
        let state = &mut entry.state;
        if state.peer_healthy && !healthy {
            log::debug!("Peer key={} became unhealthy", entry.record.public_key);
        }
        state.peer_healthy = healthy;
        if healthy {
            state.peer_healthy_time = Some(now);
        }
    }

    /// Candidate list for a peer under the current posture
    pub fn candidates(&self, record: &PeerRecord, relay_healthy: bool) -> Vec<Candidate> {
        candidate_list(&self.posture, record, relay_healthy)
    }

    /// Choose the peering method for a peer and update its state
    ///
    /// A healthy or recently healthy peer keeps its method, even if role
    /// flags changed the candidate list. If a refreshed record no longer
    /// carries the endpoint that method uses, the peer starts over from the
    /// first candidate.
    pub fn decide(
        &self,
        entry: &mut PeerCacheEntry,
        relay_healthy: bool,
        now: Instant,
    ) -> Decision {
        let PeerCacheEntry { record, state } = entry;
        let candidates = self.candidates(record, relay_healthy);

        if let Some(method) = state.method {
            let within_grace = state
                .peer_healthy_time
                .map_or(false, |t| now.saturating_duration_since(t) < self.restore_timeout);

            // A kept method still needs its endpoint in the current record
            match resolve(method, record) {
                Some(kept) if state.peer_healthy || within_grace => {
                    log::debug!(
                        "Keeping {} for key={} (healthy={})",
                        method,
                        record.public_key,
                        state.peer_healthy
                    );
                    // Role flag changes may drop the method from the list; keep its index then
                    let index = candidates
                        .iter()
                        .position(|c| c.method == method)
                        .or(state.method_index)
                        .unwrap_or(0);
                    state.method_index = Some(index);
                    return Decision {
                        destination: kept.destination,
                        method,
                        index,
                    };
                }
                None if state.peer_healthy || within_grace => {
                    log::info!(
                        "Peer key={} no longer supports {}, choosing again",
                        record.public_key,
                        method
                    );
                    state.method_index = None;
                }
                _ => {}
            }
        }

        let clamp = candidates
            .last()
            .map_or(false, |c| c.method.is_via_relay());
        let index = next_index(state.method_index, candidates.len(), clamp);
        let chosen = &candidates[index];

        if state.method != Some(chosen.method) {
            log::info!(
                "Peer key={} peering method {} -> {}",
                record.public_key,
                state.method.map_or("undecided", |m| m.as_str()),
                chosen.method
            );
        }

        state.method = Some(chosen.method);
        state.method_index = Some(index);
        state.peering_time = Some(now);

        Decision {
            destination: chosen.destination.clone(),
            method: chosen.method,
            index,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    fn record(local: &str, stun: &str) -> PeerRecord {
        PeerRecord::new("bacon", vec![Endpoint::local(local), Endpoint::reflexive(stun)])
    }

    fn methods(candidates: &[Candidate]) -> Vec<PeeringMethod> {
        candidates.iter().map(|c| c.method).collect()
    }

    fn base() -> LocalPosture {
        LocalPosture::new("1.1.1.1:1234")
    }

    #[test]
    fn test_method_names() {
        assert_eq!(PeeringMethod::DirectLocal.to_string(), "direct-local");
        assert_eq!(PeeringMethod::RelayPeerDirectLocal.to_string(), "relay-peer-direct-local");
        assert_eq!(PeeringMethod::None.to_string(), "none");

        let json = serde_json::to_string(&PeeringMethod::RelaySelfDirectLocal).unwrap();
        assert_eq!(json, "\"relay-self-direct-local\"");
    }

    #[test]
    fn test_destination_sources() {
        assert!(PeeringMethod::DirectLocal.is_direct_local());
        assert!(PeeringMethod::RelaySelfDirectLocal.is_direct_local());
        assert!(!PeeringMethod::RelayPeer.is_direct_local());
        assert_eq!(
            PeeringMethod::RelayPeer.destination_source(),
            Some(EndpointSource::Reflexive)
        );
        assert_eq!(PeeringMethod::ViaRelay.destination_source(), None);
        assert!(PeeringMethod::ViaRelay.is_via_relay());
        assert!(!PeeringMethod::RelayPeer.is_via_relay());
    }

    #[test]
    fn test_classify_precedence() {
        let peer = record("192.168.10.50:5678", "2.2.2.2:4321");
        let mut relay_peer = peer.clone();
        relay_peer.relay = true;
        let mut nat_peer = peer.clone();
        nat_peer.symmetric_nat = true;

        let relay_self = base().with_relay(true).with_symmetric_nat(true);
        assert_eq!(Scenario::classify(&relay_self, &relay_peer, true), Scenario::LocalIsRelay);
        assert_eq!(Scenario::classify(&base(), &relay_peer, false), Scenario::RemoteIsRelay);
        assert_eq!(Scenario::classify(&base(), &nat_peer, false), Scenario::SymmetricNat);
        assert_eq!(
            Scenario::classify(&base(), &nat_peer, true),
            Scenario::SymmetricNatWithRelay
        );
        assert_eq!(Scenario::classify(&base(), &peer, true), Scenario::Normal);
    }

    #[test]
    fn test_candidate_list_same_network() {
        let peer = record("192.168.10.50:5678", "1.1.1.1:4321");

        let list = candidate_list(&base(), &peer, false);
        assert_eq!(methods(&list), vec![PeeringMethod::DirectLocal, PeeringMethod::Reflexive]);
        assert_eq!(list[0].destination.as_deref(), Some("192.168.10.50:5678"));
        assert_eq!(list[1].destination.as_deref(), Some("1.1.1.1:4321"));

        let list = candidate_list(&base(), &peer, true);
        assert_eq!(
            methods(&list),
            vec![
                PeeringMethod::DirectLocal,
                PeeringMethod::Reflexive,
                PeeringMethod::ViaRelay
            ]
        );
        assert_eq!(list[2].destination, None);
    }

    #[test]
    fn test_candidate_list_skips_missing_endpoints() {
        // Same public network, but no LAN address advertised
        let peer = PeerRecord::new("bacon", vec![Endpoint::reflexive("1.1.1.1:4321")]);
        let list = candidate_list(&base(), &peer, false);
        assert_eq!(methods(&list), vec![PeeringMethod::Reflexive]);

        // Nothing advertised at all
        let peer = PeerRecord::new("bacon", Vec::new());
        let list = candidate_list(&base(), &peer, false);
        assert_eq!(methods(&list), vec![PeeringMethod::None]);
        assert_eq!(list[0].destination, None);

        let list = candidate_list(&base(), &peer, true);
        assert_eq!(methods(&list), vec![PeeringMethod::ViaRelay]);
    }

    #[test]
    fn test_candidate_list_symmetric_nat() {
        let nat = base().with_symmetric_nat(true);

        let same = record("192.168.10.50:5678", "1.1.1.1:4321");
        assert_eq!(
            methods(&candidate_list(&nat, &same, false)),
            vec![PeeringMethod::DirectLocal]
        );

        let other = record("192.168.10.50:5678", "2.2.2.2:4321");
        assert_eq!(methods(&candidate_list(&nat, &other, false)), vec![PeeringMethod::None]);
        assert_eq!(
            methods(&candidate_list(&nat, &other, true)),
            vec![PeeringMethod::ViaRelay]
        );
    }

    #[test]
    fn test_next_index() {
        assert_eq!(next_index(None, 3, true), 0);
        assert_eq!(next_index(Some(0), 3, true), 1);
        assert_eq!(next_index(Some(2), 3, true), 2);
        assert_eq!(next_index(Some(1), 2, false), 0);
        assert_eq!(next_index(Some(0), 1, false), 0);

        // Stale index from a longer list
        assert_eq!(next_index(Some(4), 2, true), 1);
        assert_eq!(next_index(Some(4), 2, false), 1);
    }

    #[test]
    fn test_first_decision_selects_first_candidate() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let now = Instant::now();

        let decision = engine.decide(&mut entry, false, now);
        assert_eq!(decision.method, PeeringMethod::DirectLocal);
        assert_eq!(decision.index, 0);
        assert_eq!(decision.destination.as_deref(), Some("192.168.10.50:5678"));
        assert!(decision.configures_endpoint());

        assert_eq!(entry.state().method(), Some(PeeringMethod::DirectLocal));
        assert_eq!(entry.state().method_index(), Some(0));
        assert_eq!(entry.state().peering_time(), Some(now));
    }

    #[test]
    fn test_healthy_peer_is_sticky() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();

        engine.decide(&mut entry, false, t0);
        engine.observe_health(&mut entry, true, t0);

        // A healthy relay appearing changes the list, not the choice
        let later = t0 + Duration::from_secs(3600);
        let decision = engine.decide(&mut entry, true, later);
        assert_eq!(decision.method, PeeringMethod::DirectLocal);
        assert_eq!(decision.index, 0);
        assert_eq!(entry.state().peering_time(), Some(t0));
    }

    #[test]
    fn test_healthy_peer_loses_kept_endpoint() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();

        assert_eq!(engine.decide(&mut entry, false, t0).method, PeeringMethod::DirectLocal);
        engine.observe_health(&mut entry, true, t0);

        // Same key, LAN endpoint withdrawn: state survives the refresh
        let moved = PeerRecord::new("bacon", vec![Endpoint::reflexive("1.1.1.1:4321")]);
        assert!(!entry.replace_record(moved));

        let later = t0 + Duration::from_secs(30);
        let decision = engine.decide(&mut entry, false, later);
        assert_eq!(decision.method, PeeringMethod::Reflexive);
        assert_eq!(decision.index, 0);
        assert_eq!(decision.destination.as_deref(), Some("1.1.1.1:4321"));
        assert_eq!(entry.state().method_index(), Some(0));
        assert_eq!(entry.state().peering_time(), Some(later));

        // Kept from here on
        let again = engine.decide(&mut entry, false, later + Duration::from_secs(30));
        assert_eq!(again, decision);
    }

    #[test]
    fn test_kept_index_follows_current_list() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();

        engine.decide(&mut entry, false, t0);
        assert_eq!(engine.decide(&mut entry, false, t0).method, PeeringMethod::Reflexive);
        engine.observe_health(&mut entry, true, t0);

        // Peer moves to another public network: direct-local drops out
        assert!(!entry.replace_record(record("192.168.10.50:5678", "2.2.2.2:4321")));
        let decision = engine.decide(&mut entry, false, t0);
        assert_eq!(decision.method, PeeringMethod::Reflexive);
        assert_eq!(decision.index, 0);
        assert_eq!(decision.destination.as_deref(), Some("2.2.2.2:4321"));
    }

    #[test]
    fn test_remote_relay_outranks_symmetric_nat() {
        let mut relay_peer = record("192.168.10.50:5678", "2.2.2.2:4321");
        relay_peer.relay = true;
        let nat = base().with_symmetric_nat(true);

        assert_eq!(Scenario::classify(&nat, &relay_peer, true), Scenario::RemoteIsRelay);
        assert_eq!(Scenario::classify(&nat, &relay_peer, false), Scenario::RemoteIsRelay);
        assert_eq!(
            methods(&candidate_list(&nat, &relay_peer, true)),
            vec![PeeringMethod::RelayPeer]
        );

        let mut nat_relay_peer = relay_peer.clone();
        nat_relay_peer.symmetric_nat = true;
        assert_eq!(
            Scenario::classify(&base(), &nat_relay_peer, false),
            Scenario::RemoteIsRelay
        );
    }

    #[test]
    fn test_grace_period_then_demotion() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();

        engine.decide(&mut entry, false, t0);
        engine.observe_health(&mut entry, true, t0);
        engine.observe_health(&mut entry, false, t0 + Duration::from_secs(10));

        let decision = engine.decide(&mut entry, false, t0 + Duration::from_secs(120));
        assert_eq!(decision.method, PeeringMethod::DirectLocal);

        let decision = engine.decide(&mut entry, false, t0 + PEERING_RESTORE_TIMEOUT);
        assert_eq!(decision.method, PeeringMethod::Reflexive);
        assert_eq!(decision.index, 1);
        assert_eq!(
            entry.state().peering_time(),
            Some(t0 + PEERING_RESTORE_TIMEOUT)
        );
    }

    #[test]
    fn test_custom_restore_timeout() {
        let engine = PeeringEngine::new(base()).with_restore_timeout(Duration::from_secs(5));
        assert_eq!(engine.restore_timeout(), Duration::from_secs(5));

        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();
        engine.decide(&mut entry, false, t0);
        engine.observe_health(&mut entry, true, t0);
        engine.observe_health(&mut entry, false, t0);

        let decision = engine.decide(&mut entry, false, t0 + Duration::from_secs(6));
        assert_eq!(decision.method, PeeringMethod::Reflexive);
    }

    #[test]
    fn test_reset_returns_to_first_candidate() {
        let engine = PeeringEngine::new(base());
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let t0 = Instant::now();

        engine.decide(&mut entry, false, t0);
        engine.decide(&mut entry, false, t0);
        assert_eq!(entry.state().method(), Some(PeeringMethod::Reflexive));

        engine.reset_peer_state(&mut entry);
        assert!(entry.state().is_undecided());
        assert_eq!(engine.decide(&mut entry, false, t0).index, 0);
    }

    #[test]
    fn test_set_posture() {
        let mut engine = PeeringEngine::new(base());
        engine.set_posture(base().with_relay(true));
        assert!(engine.posture().relay);

        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "1.1.1.1:4321"));
        let decision = engine.decide(&mut entry, false, Instant::now());
        assert_eq!(decision.method, PeeringMethod::RelaySelfDirectLocal);
    }

    #[test]
    fn test_unreachable_decision() {
        let engine = PeeringEngine::new(base().with_symmetric_nat(true));
        let mut entry = PeerCacheEntry::new(record("192.168.10.50:5678", "2.2.2.2:4321"));

        let decision = engine.decide(&mut entry, false, Instant::now());
        assert!(decision.is_unreachable());
        assert!(!decision.configures_endpoint());
        assert_eq!(decision.to_string(), "none (candidate 0)");
    }
}
