use std::net::IpAddr;
use std::path::PathBuf;

use crate::limits::DEFAULT_HOLD_TTL_MS;
use crate::model::{EventConflictPolicy, Ms};
use crate::slots::OperatingHours;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Per-engine behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub hold_ttl_ms: Ms,
    /// Used when a venue's opening hours don't parse.
    pub fallback_hours: OperatingHours,
    pub event_conflict_policy: EventConflictPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_ttl_ms: DEFAULT_HOLD_TTL_MS,
            fallback_hours: OperatingHours::FALLBACK,
            event_conflict_policy: EventConflictPolicy::Reject,
        }
    }
}

/// Server configuration, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: IpAddr,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their default; set but
    /// malformed keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let hold_ttl_secs: u32 = parse_or(&lookup, "COURTSIDE_HOLD_TTL_SECS", "seconds", 480)?;
        let event_conflict_policy = parse_or(
            &lookup,
            "COURTSIDE_EVENT_CONFLICT_POLICY",
            "reject or unchecked",
            EventConflictPolicy::Reject,
        )?;

        Ok(Self {
            port: parse_or(&lookup, "COURTSIDE_PORT", "a port number", 5433)?,
            bind: parse_or(&lookup, "COURTSIDE_BIND", "an IP address", IpAddr::from([0, 0, 0, 0]))?,
            data_dir: lookup("COURTSIDE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            password: lookup("COURTSIDE_PASSWORD").unwrap_or_else(|| "courtside".into()),
            max_connections: parse_or(&lookup, "COURTSIDE_MAX_CONNECTIONS", "a positive integer", 256)?,
            compact_threshold: parse_or(&lookup, "COURTSIDE_COMPACT_THRESHOLD", "an integer", 1000)?,
            metrics_port: match lookup("COURTSIDE_METRICS_PORT") {
                Some(v) => Some(parse_value("COURTSIDE_METRICS_PORT", "a port number", v)?),
                None => None,
            },
            engine: EngineConfig {
                hold_ttl_ms: Ms::from(hold_ttl_secs) * 1000,
                event_conflict_policy,
                ..EngineConfig::default()
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(v) => parse_value(var, expected, v),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(
    var: &'static str,
    expected: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, expected, value })
}
