//! Port-forwarding rules reconciled onto the host
//!
//! Rules are written as `protocol:listen_port:dest_host:dest_port`, e.g.
//! `tcp:8080:10.0.0.5:80` or `udp:53:[fd00::53]:53`. Every token after the
//! second colon is rejoined before splitting host from port, so IPv6
//! destinations parse as long as they are bracketed.
//!
//! A rule is identified by its [`RuleKey`]; at most one rule exists per
//! (direction, protocol, listen port).

use std::fmt;

use crate::endpoint::{join_host_port, split_host_port};

/// Lowest valid port number
const MIN_PORT: i64 = 1;

/// Highest valid port number
const MAX_PORT: i64 = 65535;

// ============================================================================
// Rule Direction / Protocol
// ============================================================================

/// Which way traffic flows through the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleDirection {
    /// Local listener forwarding out into the mesh
    Egress,
    /// Mesh listener forwarding to a local or LAN destination
    Ingress,
}

impl fmt::Display for RuleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleDirection::Egress => write!(f, "egress"),
            RuleDirection::Ingress => write!(f, "ingress"),
        }
    }
}

/// Transport protocol forwarded by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleProtocol {
    Tcp,
    Udp,
}

impl RuleProtocol {
    /// Parse a protocol token, ignoring case
    pub fn parse(token: &str) -> Result<Self, RuleError> {
        match token.to_ascii_lowercase().as_str() {
            "tcp" => Ok(RuleProtocol::Tcp),
            "udp" => Ok(RuleProtocol::Udp),
            _ => Err(RuleError::UnknownProtocol(token.to_string())),
        }
    }
}

impl fmt::Display for RuleProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleProtocol::Tcp => write!(f, "tcp"),
            RuleProtocol::Udp => write!(f, "udp"),
        }
    }
}

// ============================================================================
// Rule Key / Destination
// ============================================================================

/// Uniqueness identity of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub direction: RuleDirection,
    pub protocol: RuleProtocol,
    pub listen_port: u16,
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.direction, self.protocol, self.listen_port)
    }
}

/// Destination a rule forwards to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

// ============================================================================
// Proxy Rule
// ============================================================================

/// A parsed port-forwarding rule
#[derive(Debug, Clone)]
pub struct ProxyRule {
    key: RuleKey,
    dest: HostPort,
    /// Whether the rule has already been applied to the host
    pub stored: bool,
}

impl ProxyRule {
    pub fn new(key: RuleKey, dest: HostPort) -> Self {
        Self {
            key,
            dest,
            stored: false,
        }
    }

    pub fn key(&self) -> RuleKey {
        self.key
    }

    pub fn direction(&self) -> RuleDirection {
        self.key.direction
    }

    pub fn protocol(&self) -> RuleProtocol {
        self.key.protocol
    }

    pub fn listen_port(&self) -> u16 {
        self.key.listen_port
    }

    pub fn dest(&self) -> &HostPort {
        &self.dest
    }

    /// `protocol:listen_port:dest_host:dest_port`, accepted back by [`parse_rule`]
    pub fn canonical_string(&self) -> String {
        self.to_string()
    }

    /// Direction-tagged flag form, e.g. `--ingress tcp:443:10.0.0.5:8443`
    pub fn as_invocation_argument(&self) -> String {
        format!("--{} {}", self.key.direction, self)
    }
}

/// Equality ignores the `stored` marker
impl PartialEq for ProxyRule {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.dest == other.dest
    }
}

impl Eq for ProxyRule {}

impl fmt::Display for ProxyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.key.protocol, self.key.listen_port, self.dest)
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_port(token: &str) -> Result<u16, RuleError> {
    let port: i64 = token
        .parse()
        .map_err(|_| RuleError::InvalidPort(token.to_string()))?;
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(RuleError::PortOutOfRange(port));
    }
    Ok(port as u16)
}

/// Parse a `protocol:listen_port:dest_host:dest_port` rule
pub fn parse_rule(rule: &str, direction: RuleDirection) -> Result<ProxyRule, RuleError> {
    let parts: Vec<&str> = rule.split(':').collect();
    if parts.len() < 3 {
        return Err(RuleError::FieldCount(rule.to_string()));
    }

    let listen_port = parse_port(parts[1])?;
    let protocol = RuleProtocol::parse(parts[0])?;

    let dest = parts[2..].join(":");
    let (host, port) =
        split_host_port(&dest).ok_or_else(|| RuleError::MalformedDestination(dest.clone()))?;
    if host.is_empty() {
        return Err(RuleError::EmptyHost(dest.clone()));
    }
    let port = parse_port(port)?;

    Ok(ProxyRule::new(
        RuleKey {
            direction,
            protocol,
            listen_port,
        },
        HostPort {
            host: host.to_string(),
            port,
        },
    ))
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while parsing a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Too few colon-separated fields
    FieldCount(String),
    /// Protocol is neither tcp nor udp
    UnknownProtocol(String),
    /// Port is not a decimal integer
    InvalidPort(String),
    /// Port is outside 1-65535
    PortOutOfRange(i64),
    /// Destination is not a valid host:port pair
    MalformedDestination(String),
    /// Destination host is empty
    EmptyHost(String),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::FieldCount(rule) => write!(
                f,
                "invalid rule format, must specify 4 colon-separated values ({})",
                rule
            ),
            RuleError::UnknownProtocol(proto) => write!(f, "invalid protocol ({})", proto),
            RuleError::InvalidPort(port) => write!(f, "invalid port ({})", port),
            RuleError::PortOutOfRange(port) => {
                write!(f, "port out of range ({}), must be {}-{}", port, MIN_PORT, MAX_PORT)
            }
            RuleError::MalformedDestination(dest) => {
                write!(f, "invalid destination host:port ({})", dest)
            }
            RuleError::EmptyHost(dest) => write!(
                f,
                "invalid destination host:port ({}): host cannot be empty",
                dest
            ),
        }
    }
}

impl std::error::Error for RuleError {}

// ============================================================================
// Tests
// ============================================================================
