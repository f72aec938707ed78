//! Configuration loading and management
//!
//! Handles parsing of `coedit.toml` configuration files. Every knob has a
//! default, so embedders can run with `Config::default()` and no file.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::parse_duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Section lock configuration
    #[serde(default)]
    pub locks: LockConfig,

    /// Snapshot cadence configuration
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Event fan-out configuration
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locks: LockConfig::default(),
            snapshots: SnapshotConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// Section lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long an unrefreshed lock stays protected from takeover
    #[serde(default = "default_lock_ttl")]
    pub ttl: String,
}

fn default_lock_ttl() -> String {
    "5m".to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: default_lock_ttl(),
        }
    }
}

/// Snapshot cadence: when the synchronizer records a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// "every_batch" or "interval"
    #[serde(default = "default_snapshot_policy")]
    pub policy: String,

    /// With the "interval" policy, snapshot after this many accumulated
    /// revisions
    #[serde(default = "default_snapshot_interval")]
    pub interval: u32,
}

fn default_snapshot_policy() -> String {
    "every_batch".to_string()
}

fn default_snapshot_interval() -> u32 {
    25
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            policy: default_snapshot_policy(),
            interval: default_snapshot_interval(),
        }
    }
}

/// Resolved snapshot policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Snapshot after every accepted batch
    EveryBatch,
    /// Snapshot once this many revisions have accumulated
    EveryRevisions(u32),
}

/// Event fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

fn default_events_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults when missing
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed lock TTL
    pub fn lock_ttl(&self) -> Result<Duration> {
        let ttl = parse_duration(&self.locks.ttl)?;
        if ttl <= Duration::zero() {
            return Err(Error::InvalidConfig(
                "locks.ttl must be positive".to_string(),
            ));
        }
        Ok(ttl)
    }

    /// Resolved snapshot policy
    pub fn snapshot_policy(&self) -> Result<SnapshotPolicy> {
        match self.snapshots.policy.as_str() {
            "every_batch" => Ok(SnapshotPolicy::EveryBatch),
            "interval" => Ok(SnapshotPolicy::EveryRevisions(self.snapshots.interval)),
            other => Err(Error::InvalidConfig(format!(
                "snapshots.policy: invalid policy '{other}' (expected every_batch|interval)"
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        self.lock_ttl()?;
        self.snapshot_policy()?;

        if self.snapshots.interval == 0 {
            return Err(Error::InvalidConfig(
                "snapshots.interval must be > 0".to_string(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(Error::InvalidConfig(
                "events.capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
