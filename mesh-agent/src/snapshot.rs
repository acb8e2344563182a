//! Peer state snapshot read from disk each tick
//!
//! The snapshot carries what the control plane, the liveness prober and the
//! relay health check would otherwise report:
//!
//! ```json
//! {
//!   "relay_healthy": true,
//!   "peers": {
//!     "device-a": {
//!       "endpoints": [
//!         {"address": "192.168.10.50:5678", "source": "local"},
//!         {"address": "1.1.1.1:4321", "source": "stun"}
//!       ],
//!       "public_key": "...",
//!       "relay": false,
//!       "symmetric_nat": false,
//!       "healthy": true
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use peering_engine::PeerRecord;
use serde::Deserialize;

/// One peer's record plus its latest health probe result
#[derive(Debug, Clone, Deserialize)]
pub struct PeerSnapshot {
    #[serde(flatten)]
    pub record: PeerRecord,
    #[serde(default)]
    pub healthy: bool,
}

/// Full mesh view for one reconciliation pass
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    /// Whether at least one relay node is currently healthy
    #[serde(default)]
    pub relay_healthy: bool,
    /// Peers keyed by device identifier
    #[serde(default)]
    pub peers: HashMap<String, PeerSnapshot>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(SnapshotError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = fs::read_to_string(path).map_err(SnapshotError::Io)?;
        Self::from_json(&json)
    }
}

/// Errors reading a snapshot
#[derive(Debug)]
pub enum SnapshotError {
    /// File could not be read
    Io(io::Error),
    /// File is not a valid snapshot
    Parse(serde_json::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "failed to read snapshot: {}", e),
            SnapshotError::Parse(e) => write!(f, "invalid snapshot: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io(e) => Some(e),
            SnapshotError::Parse(e) => Some(e),
        }
    }
}
