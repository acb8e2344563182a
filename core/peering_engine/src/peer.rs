//! Per-peer cache of control plane records and connectivity state
//!
//! Each peer known to the mesh has one [`PeerCacheEntry`]: the latest
//! [`PeerRecord`] reported by the control plane plus the
//! [`ConnectivityState`] tracked locally by the peering engine.
//!
//! Records are replaced wholesale on refresh. The connectivity state is
//! reset whenever a refresh changes the peer's identity (public key) or
//! relay role, since the previous decision no longer describes this peer.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::endpoint::{find_endpoint, Endpoint, EndpointSource};
use crate::peering::PeeringMethod;

// ============================================================================
// Peer Record
// ============================================================================

/// Device record for a peer as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Known endpoints, in control plane order
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Tunnel public key
    pub public_key: String,
    /// Whether the peer is a relay node
    #[serde(default, alias = "isRelay")]
    pub relay: bool,
    /// Whether the peer is behind a symmetric NAT
    #[serde(default, alias = "isSymmetricNat")]
    pub symmetric_nat: bool,
}

impl PeerRecord {
    pub fn new(public_key: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            public_key: public_key.into(),
            relay: false,
            symmetric_nat: false,
        }
    }

    /// Address of the first endpoint discovered by `source`
    pub fn address(&self, source: EndpointSource) -> Option<&str> {
        find_endpoint(&self.endpoints, source).map(|e| e.address.as_str())
    }

    /// The peer's locally enumerated (LAN) address
    pub fn local_address(&self) -> Option<&str> {
        self.address(EndpointSource::Local)
    }

    /// The peer's reflexive (public) address
    pub fn reflexive_address(&self) -> Option<&str> {
        self.address(EndpointSource::Reflexive)
    }

    /// Whether replacing `self` with `other` changes who the peer is
    fn identity_changed(&self, other: &PeerRecord) -> bool {
        self.public_key != other.public_key || self.relay != other.relay
    }
}

// ============================================================================
// Connectivity State
// ============================================================================

/// Locally tracked connectivity state for one peer
///
/// Only the peering engine mutates this state. The undecided state has no
/// method, no index and no timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectivityState {
    /// Currently chosen peering method
    pub(crate) method: Option<PeeringMethod>,
    /// Index of the chosen method in the current candidate list
    pub(crate) method_index: Option<usize>,
    /// When the current method was chosen
    pub(crate) peering_time: Option<Instant>,
    /// Latest health signal from the liveness prober
    pub(crate) peer_healthy: bool,
    /// When the peer was last seen healthy
    pub(crate) peer_healthy_time: Option<Instant>,
}

impl ConnectivityState {
    pub fn method(&self) -> Option<PeeringMethod> {
        self.method
    }

    pub fn method_index(&self) -> Option<usize> {
        self.method_index
    }

    pub fn peering_time(&self) -> Option<Instant> {
        self.peering_time
    }

    pub fn peer_healthy(&self) -> bool {
        self.peer_healthy
    }

    pub fn peer_healthy_time(&self) -> Option<Instant> {
        self.peer_healthy_time
    }

    /// Whether no peering method has been chosen yet
    pub fn is_undecided(&self) -> bool {
        self.method.is_none() || self.method_index.is_none()
    }

    pub(crate) fn reset(&mut self) {
        *self = ConnectivityState::default();
    }
}

// ============================================================================
// Peer Cache Entry
// ============================================================================

/// Control plane record plus connectivity state for a single peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCacheEntry {
    pub(crate) record: PeerRecord,
    pub(crate) state: ConnectivityState,
}

impl PeerCacheEntry {
    /// Create an entry for a newly observed peer, in the undecided state
    pub fn new(record: PeerRecord) -> Self {
        Self {
            record,
            state: ConnectivityState::default(),
        }
    }

    pub fn record(&self) -> &PeerRecord {
        &self.record
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// Replace the peer record, resetting connectivity state on identity change
    ///
    /// Returns true if the connectivity state was reset.
    pub fn replace_record(&mut self, record: PeerRecord) -> bool {
        let reset = self.record.identity_changed(&record);
        if reset {
            self.state.reset();
        }
        self.record = record;
        reset
    }
}

// ============================================================================
// Peer Cache
// ============================================================================

/// Outcome of refreshing a peer in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Peer was not known before
    Added,
    /// Record replaced, connectivity state kept
    Updated,
    /// Record replaced and connectivity state reset (identity or role changed)
    Reset,
}

/// Cache of peer entries keyed by device identifier
///
/// Callers hand out `&mut PeerCacheEntry` to the engine one peer at a time,
/// so a record refresh can never interleave with a decision on that peer.
#[derive(Debug, Default)]
pub struct PeerCache {
    entries: HashMap<String, PeerCacheEntry>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or replace a peer's control plane record
    pub fn refresh(&mut self, device_id: &str, record: PeerRecord) -> RefreshOutcome {
        match self.entries.get_mut(device_id) {
            Some(entry) => {
                if entry.replace_record(record) {
                    log::info!("Peer {} changed identity or role, resetting peering", device_id);
                    RefreshOutcome::Reset
                } else {
                    RefreshOutcome::Updated
                }
            }
            None => {
                log::info!("Peer {} joined (key={})", device_id, record.public_key);
                self.entries
                    .insert(device_id.to_string(), PeerCacheEntry::new(record));
                RefreshOutcome::Added
            }
        }
    }

    /// Remove a peer that left the mesh
    pub fn remove(&mut self, device_id: &str) -> Option<PeerCacheEntry> {
        let removed = self.entries.remove(device_id);
        if removed.is_some() {
            log::info!("Peer {} left the mesh", device_id);
        }
        removed
    }

    /// Drop every peer for which `keep` returns false
    ///
    /// Returns the identifiers of the removed peers.
    pub fn retain_ids<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let gone: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();

        for id in &gone {
            self.remove(id);
        }

        gone
    }

    pub fn get(&self, device_id: &str) -> Option<&PeerCacheEntry> {
        self.entries.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut PeerCacheEntry> {
        self.entries.get_mut(device_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
