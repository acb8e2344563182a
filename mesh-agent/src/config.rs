//! Command line configuration for the mesh agent
//!
//! ```text
//! --state <path>            Peer state snapshot (JSON), re-read every tick
//! --reflexive <host:port>   Own reflexive address
//! --relay                   This node is a relay
//! --symmetric-nat           This node is behind symmetric NAT
//! --interval <secs>         Reconciliation interval (default 10)
//! --restore-timeout <secs>  Peering restore timeout (default 180)
//! --ingress <rule>          Ingress rule, repeatable
//! --egress <rule>           Egress rule, repeatable
//! --once                    Run a single reconciliation pass
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use peering_engine::endpoint::split_host_port;
use peering_engine::{
    parse_rule, LocalPosture, ProxyRule, RuleDirection, RuleError, PEERING_RESTORE_TIMEOUT,
};

/// Default reconciliation interval
///
/// Also the retry pace for peers that have never been healthy, which move to
/// the next candidate on every pass.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Agent configuration assembled from the command line
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Snapshot file standing in for the control plane and health prober
    pub state_path: PathBuf,
    /// Local node posture
    pub posture: LocalPosture,
    /// Time between reconciliation passes
    pub interval: Duration,
    /// Peering restore timeout
    pub restore_timeout: Duration,
    /// Desired network rules
    pub rules: Vec<ProxyRule>,
    /// Exit after one pass
    pub once: bool,
}

impl AgentConfig {
    /// Build the configuration from `std::env::args()`-style arguments
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let state_path = parse_arg(args, "--state")
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingArgument("--state"))?;

        let reflexive =
            parse_arg(args, "--reflexive").ok_or(ConfigError::MissingArgument("--reflexive"))?;
        if split_host_port(&reflexive).map_or(true, |(host, _)| host.is_empty()) {
            return Err(ConfigError::InvalidValue {
                flag: "--reflexive",
                value: reflexive,
            });
        }

        let posture = LocalPosture::new(reflexive)
            .with_relay(has_flag(args, "--relay"))
            .with_symmetric_nat(has_flag(args, "--symmetric-nat"));

        let interval = parse_secs(args, "--interval")?.unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                flag: "--interval",
                value: "0".to_string(),
            });
        }
        let restore_timeout =
            parse_secs(args, "--restore-timeout")?.unwrap_or(PEERING_RESTORE_TIMEOUT);

        let mut rules = Vec::new();
        for (flag, direction) in [
            ("--ingress", RuleDirection::Ingress),
            ("--egress", RuleDirection::Egress),
        ] {
            for spec in parse_all_args(args, flag) {
                let rule = parse_rule(&spec, direction)
                    .map_err(|source| ConfigError::InvalidRule { flag, source })?;
                rules.push(rule);
            }
        }

        Ok(AgentConfig {
            state_path,
            posture,
            interval,
            restore_timeout,
            rules,
            once: has_flag(args, "--once"),
        })
    }
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Every value given for a repeatable flag, in order
fn parse_all_args(args: &[String], flag: &str) -> Vec<String> {
    args.iter()
        .enumerate()
        .filter(|(_, a)| *a == flag)
        .filter_map(|(i, _)| args.get(i + 1))
        .cloned()
        .collect()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_secs(args: &[String], flag: &'static str) -> Result<Option<Duration>, ConfigError> {
    match parse_arg(args, flag) {
        Some(value) => value
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::InvalidValue { flag, value }),
        None => Ok(None),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors in the agent's command line
#[derive(Debug)]
pub enum ConfigError {
    /// Required flag not given
    MissingArgument(&'static str),
    /// Flag value could not be parsed
    InvalidValue { flag: &'static str, value: String },
    /// Network rule could not be parsed
    InvalidRule {
        flag: &'static str,
        source: RuleError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingArgument(flag) => write!(f, "missing required argument {}", flag),
            ConfigError::InvalidValue { flag, value } => {
                write!(f, "invalid value for {}: {}", flag, value)
            }
            ConfigError::InvalidRule { flag, source } => {
                write!(f, "invalid {} rule: {}", flag, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidRule { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
