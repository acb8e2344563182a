//! Peer endpoints and the local node's network posture
//!
//! A peer advertises several `host:port` endpoints, each tagged with how it
//! was discovered: local interface enumeration or an external reflexive
//! (STUN-style) observation. Only the first endpoint of each source is used.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Endpoint Source
// ============================================================================

/// How an endpoint address was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointSource {
    /// Enumerated from the peer's own network interfaces (LAN address)
    #[serde(rename = "local")]
    Local,
    /// Observed externally by an address discovery service
    #[serde(rename = "stun")]
    Reflexive,
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSource::Local => write!(f, "local"),
            EndpointSource::Reflexive => write!(f, "stun"),
        }
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A reachable `host:port` address of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport address as reported by the control plane (`host:port`)
    pub address: String,
    /// Discovery source of the address
    pub source: EndpointSource,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, source: EndpointSource) -> Self {
        Self {
            address: address.into(),
            source,
        }
    }

    /// Create an endpoint from a locally enumerated address
    pub fn local(address: impl Into<String>) -> Self {
        Self::new(address, EndpointSource::Local)
    }

    /// Create an endpoint from a reflexive (externally observed) address
    pub fn reflexive(address: impl Into<String>) -> Self {
        Self::new(address, EndpointSource::Reflexive)
    }

    /// Host component of the address, without port or IPv6 brackets
    pub fn host(&self) -> Option<&str> {
        split_host_port(&self.address).map(|(host, _)| host)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.source)
    }
}

/// Find the first endpoint discovered by `source`
pub fn find_endpoint(endpoints: &[Endpoint], source: EndpointSource) -> Option<&Endpoint> {
    endpoints.iter().find(|e| e.source == source)
}

// ============================================================================
// Host:Port Splitting
// ============================================================================

/// Split a `host:port` string into its host and port parts
///
/// Accepts `host:port`, `1.2.3.4:port` and bracketed IPv6 literals
/// (`[fd00::1]:port`). An unbracketed host must not contain a colon.
/// The port is returned unparsed and may be empty.
pub fn split_host_port(hostport: &str) -> Option<(&str, &str)> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?;
        if port.contains(['[', ']', ':']) {
            return None;
        }
        return Some((host, port));
    }

    let (host, port) = hostport.rsplit_once(':')?;
    if host.contains([':', '[', ']']) || port.contains(['[', ']']) {
        return None;
    }
    Some((host, port))
}

/// Join a host and port, bracketing hosts that contain colons (IPv6)
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

// ============================================================================
// Local Node Posture
// ============================================================================

/// The local node's own network posture
///
/// Redetected externally; held fixed for the duration of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalPosture {
    /// Own public `host:port` as observed by address discovery
    pub reflexive_address: String,
    /// Whether this node acts as a relay for the mesh
    pub relay: bool,
    /// Whether this node is behind a symmetric NAT
    pub symmetric_nat: bool,
}

impl LocalPosture {
    pub fn new(reflexive_address: impl Into<String>) -> Self {
        Self {
            reflexive_address: reflexive_address.into(),
            relay: false,
            symmetric_nat: false,
        }
    }

    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_symmetric_nat(mut self, symmetric_nat: bool) -> Self {
        self.symmetric_nat = symmetric_nat;
        self
    }

    /// Whether a peer's reflexive address shares our public network
    ///
    /// Two nodes share a public network when their reflexive addresses
    /// have the same host; ports are ignored.
    pub fn shares_public_network(&self, peer_reflexive: &str) -> bool {
        match (
            split_host_port(&self.reflexive_address),
            split_host_port(peer_reflexive),
        ) {
            (Some((own, _)), Some((peer, _))) => !own.is_empty() && own == peer,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
