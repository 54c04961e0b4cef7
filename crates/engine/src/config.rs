//! Node configuration via `plexus.toml`
//!
//! A node reads its settings from a config file in its data directory. On
//! first open a commented default `plexus.toml` is written; to change
//! settings, edit the file and restart the node.

use plexus_assembler::AssemblerConfig;
use plexus_core::{PlexusError, PlexusResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the node's data directory
pub const CONFIG_FILE_NAME: &str = "plexus.toml";

/// Default interval of the lease reaper
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 1_000;

/// Lease reaper settings, the `[reaper]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// How often expired leases are collected and owned leases renewed
    pub interval_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_REAPER_INTERVAL_MS,
        }
    }
}

impl ReaperConfig {
    /// Reaper interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Repair settings, the `[repair]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Re-resolve owned sessions when one of their elements fails
    pub on_failure: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { on_failure: true }
    }
}

/// Node configuration loaded from `plexus.toml`
///
/// # Example
///
/// ```toml
/// [assembler]
/// system = "kitchen"
/// strategy = "peer-to-peer"
///
/// [reaper]
/// interval_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Assembler settings, including the system id
    pub assembler: AssemblerConfig,
    /// Lease reaper settings
    pub reaper: ReaperConfig,
    /// Repair settings
    pub repair: RepairConfig,
}

impl NodeConfig {
    /// Defaults for the given system
    pub fn new(assembler: AssemblerConfig) -> Self {
        Self {
            assembler,
            ..Self::default()
        }
    }

    /// Use another reaper interval
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Turn repair on element failure on or off
    pub fn with_repair_on_failure(mut self, enabled: bool) -> Self {
        self.repair.on_failure = enabled;
        self
    }

    /// Check the settings
    ///
    /// The reaper renews the leases of owned sessions, so it must run more
    /// often than a lease lasts.
    ///
    /// # Errors
    /// `InvalidConfig` naming the offending value.
    pub fn validate(&self) -> PlexusResult<()> {
        self.assembler.validate()?;
        if self.reaper.interval_ms == 0 {
            return Err(PlexusError::InvalidConfig(
                "reaper interval_ms must be positive".to_string(),
            ));
        }
        if self.reaper.interval_ms >= self.assembler.lease_duration_ms {
            return Err(PlexusError::InvalidConfig(format!(
                "reaper interval_ms ({}) must be shorter than lease_duration_ms ({})",
                self.reaper.interval_ms, self.assembler.lease_duration_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Plexus node configuration

[assembler]
# Name of this system, unique among the systems that assemble together
system = "local"
# Lease granted to every session; owners renew it on each reaper pass
lease_duration_ms = 30000
# How long an origin waits for a delegated subtree to be reported
report_timeout_ms = 5000
# "coordinated": this system resolves every node, asking others for offers
# "peer-to-peer": whole subtrees are delegated to other systems
strategy = "coordinated"

[reaper]
# How often expired leases are collected (must be shorter than the lease)
interval_ms = 1000

[repair]
# Re-resolve owned sessions when one of their elements fails
on_failure = true
"#
    }

    /// Read and parse config from a file path
    ///
    /// # Errors
    /// `Io` if the file cannot be read; `InvalidConfig` if it does not parse
    /// or holds invalid values.
    pub fn from_file(path: &Path) -> PlexusResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content).map_err(|e| {
            PlexusError::InvalidConfig(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> PlexusResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> PlexusResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PlexusError::Internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
