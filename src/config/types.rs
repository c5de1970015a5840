//! Configuration types and structures.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

impl Config {
    /// Load configuration from a single file, ignoring tiers.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.coordination.validate()
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file shared by every agent of the fold.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".fold-coord/coord.db")
}

/// Dedup, contention and claim-liveness tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Title similarity at or above which a new task is rejected.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Task-vs-claim similarity at or above which a task is contested.
    #[serde(default = "default_contention_threshold")]
    pub contention_threshold: f64,

    /// Claims older than this are expired.
    #[serde(default = "default_claim_window_minutes")]
    pub claim_window_minutes: u64,

    /// How many recent task rows dedup, listing and availability look at.
    #[serde(default = "default_task_scan_limit")]
    pub task_scan_limit: usize,

    /// How many recent claim events the aggregation view folds.
    #[serde(default = "default_claim_scan_limit")]
    pub claim_scan_limit: usize,

    /// How many unclaim / session-end events the aggregation view considers.
    #[serde(default = "default_terminator_scan_limit")]
    pub terminator_scan_limit: usize,

    /// A manual claim is refused for a file that already has this many live claimants.
    #[serde(default = "default_max_file_claimants")]
    pub max_file_claimants: usize,

    /// When set, live claims of agents silent for this long are dropped too.
    #[serde(default)]
    pub idle_minutes: Option<u64>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: default_dedup_threshold(),
            contention_threshold: default_contention_threshold(),
            claim_window_minutes: default_claim_window_minutes(),
            task_scan_limit: default_task_scan_limit(),
            claim_scan_limit: default_claim_scan_limit(),
            terminator_scan_limit: default_terminator_scan_limit(),
            max_file_claimants: default_max_file_claimants(),
            idle_minutes: None,
        }
    }
}

impl CoordinationConfig {
    pub fn claim_window(&self) -> Duration {
        Duration::from_secs(self.claim_window_minutes * 60)
    }

    pub fn idle_window(&self) -> Option<Duration> {
        self.idle_minutes.map(|m| Duration::from_secs(m * 60))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("dedup_threshold", self.dedup_threshold),
            ("contention_threshold", self.contention_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!(
                    "coordination.{} must be between 0 and 1, got {}",
                    name,
                    value
                ));
            }
        }
        if self.claim_window_minutes == 0 {
            return Err(anyhow!("coordination.claim_window_minutes must be positive"));
        }
        if self.task_scan_limit == 0 || self.claim_scan_limit == 0 {
            return Err(anyhow!("coordination scan limits must be positive"));
        }
        Ok(())
    }
}

fn default_dedup_threshold() -> f64 {
    crate::similarity::DEDUP_THRESHOLD
}

fn default_contention_threshold() -> f64 {
    crate::similarity::CONTENTION_THRESHOLD
}

fn default_claim_window_minutes() -> u64 {
    120
}

fn default_task_scan_limit() -> usize {
    100
}

fn default_claim_scan_limit() -> usize {
    50
}

fn default_terminator_scan_limit() -> usize {
    100
}

fn default_max_file_claimants() -> usize {
    2
}

/// Default identity for this process. CLI flags and environment win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_fold")]
    pub fold: String,

    /// Base user name; the agent name is derived from it when not given.
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fold: default_fold(),
            user: None,
        }
    }
}

fn default_fold() -> String {
    "default".to_string()
}
