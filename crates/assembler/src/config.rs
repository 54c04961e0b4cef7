//! Assembler configuration

use plexus_core::{PlexusError, PlexusResult, SystemId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default lease length
pub const DEFAULT_LEASE_DURATION_MS: u64 = 30_000;

/// Default time the origin waits for a delegated report
pub const DEFAULT_REPORT_TIMEOUT_MS: u64 = 5_000;

/// Longest lease or report timeout accepted, one week
pub const MAX_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// How a session's tree is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// The origin resolves every node, asking remote systems only for offers
    /// and commits
    #[default]
    Coordinated,
    /// The origin hands whole subtrees to remote assemblers
    PeerToPeer,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Coordinated => f.write_str("coordinated"),
            Strategy::PeerToPeer => f.write_str("peer-to-peer"),
        }
    }
}

/// Settings of one assembler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Identity of the hosting system
    pub system: SystemId,
    /// Lease granted to each prepared session
    pub lease_duration_ms: u64,
    /// How long the origin waits for a delegated report
    pub report_timeout_ms: u64,
    /// Resolution strategy for sessions owned here
    pub strategy: Strategy,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            system: SystemId::new("local"),
            lease_duration_ms: DEFAULT_LEASE_DURATION_MS,
            report_timeout_ms: DEFAULT_REPORT_TIMEOUT_MS,
            strategy: Strategy::Coordinated,
        }
    }
}

impl AssemblerConfig {
    /// Defaults for the given system
    pub fn new(system: impl Into<SystemId>) -> Self {
        Self {
            system: system.into(),
            ..Self::default()
        }
    }

    /// Use another strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Use another lease length
    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Use another report timeout
    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Lease length
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Report timeout
    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }

    /// Check the settings
    ///
    /// # Errors
    /// `InvalidConfig` for an empty system id, or a duration that is zero
    /// or longer than `MAX_DURATION_MS`.
    pub fn validate(&self) -> PlexusResult<()> {
        if self.system.as_str().is_empty() {
            return Err(PlexusError::InvalidConfig("system id is empty".to_string()));
        }
        check_duration("lease_duration_ms", self.lease_duration_ms)?;
        check_duration("report_timeout_ms", self.report_timeout_ms)
    }
}

fn check_duration(name: &str, value: u64) -> PlexusResult<()> {
    if value == 0 {
        return Err(PlexusError::InvalidConfig(format!("{} must be positive", name)));
    }
    if value > MAX_DURATION_MS {
        return Err(PlexusError::InvalidConfig(format!(
            "{} ({}) exceeds the maximum of {}",
            name, value, MAX_DURATION_MS
        )));
    }
    Ok(())
}
