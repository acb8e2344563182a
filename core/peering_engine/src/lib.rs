//! Mesh Agent Peering Engine
//!
//! This crate provides the core of the mesh data-plane agent, handling:
//! - Peer endpoint and local posture modelling
//! - Per-peer cache of control plane records and connectivity state
//! - Peering method selection with hysteresis
//! - Port-forwarding rule parsing and the desired rule table
//!
//! Everything here is synchronous and performs no I/O. Control plane
//! refresh, health probing, tunnel configuration and host rule
//! application are the caller's concern.
//!
//! ```text
//! control plane ──► PeerCache ──► PeeringEngine::decide ──► tunnel config
//!                       ▲                  ▲
//!        health probe ──┘   relay health ──┘
//!
//! --ingress/--egress ──► parse_rule ──► RuleTable::pending ──► host rules
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod endpoint;
pub mod peer;
pub mod peering;
pub mod rule;
pub mod rule_table;

// Re-export commonly used types
pub use endpoint::{Endpoint, EndpointSource, LocalPosture};
pub use peer::{ConnectivityState, PeerCache, PeerCacheEntry, PeerRecord, RefreshOutcome};
pub use peering::{
    candidate_list,
    Candidate,
    Decision,
    PeeringEngine,
    PeeringMethod,
    Scenario,
    PEERING_RESTORE_TIMEOUT,
};
pub use rule::{
    parse_rule,
    HostPort,
    ProxyRule,
    RuleDirection,
    RuleError,
    RuleKey,
    RuleProtocol,
};
pub use rule_table::RuleTable;
