//! Configuration loader with tier-based merging.
//!
//! Tiers, lowest to highest: embedded defaults, project
//! (`./.fold-coord/config.yaml`), user (`~/.fold-coord/config.yaml`), then
//! environment variables. YAML tiers are deep-merged field by field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Explicit config file, bypasses tier merging.
pub const ENV_CONFIG_PATH: &str = "FOLD_COORD_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "FOLD_COORD_DB_PATH";
pub const ENV_FOLD: &str = "FOLD_COORD_FOLD";
pub const ENV_USER: &str = "FOLD_COORD_USER";
pub const ENV_USER_DIR: &str = "FOLD_COORD_USER_DIR";
pub const ENV_PROJECT_DIR: &str = "FOLD_COORD_PROJECT_DIR";

const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var(ENV_USER_DIR)
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".fold-coord")));

        let project_dir = std::env::var(ENV_PROJECT_DIR)
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(".fold-coord")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Files that contributed, with their tier.
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Ok(explicit_path) = std::env::var(ENV_CONFIG_PATH) {
            let path = PathBuf::from(&explicit_path);
            let mut config = Config::load(&path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                sources: vec![(ConfigTier::Environment, path)],
            });
        }

        let mut layers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut sources = Vec::new();

        let tiers = [
            (ConfigTier::Project, paths.project_dir.clone()),
            (ConfigTier::User, paths.user_dir.clone()),
        ];
        for (tier, dir) in tiers {
            let Some(dir) = dir else { continue };
            let file = dir.join(CONFIG_FILE);
            if let Some(value) = read_yaml_layer(&file) {
                debug!(tier = %tier, path = %file.display(), "Loaded config layer");
                layers.push(value);
                sources.push((tier, file));
            }
        }

        let merged = deep_merge_all(layers);
        let mut config: Config = serde_json::from_value(merged)?;
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            config.server.db_path = PathBuf::from(db_path);
        }
        if let Ok(fold) = std::env::var(ENV_FOLD) {
            config.identity.fold = fold;
        }
        if let Ok(user) = std::env::var(ENV_USER) {
            config.identity.user = Some(user);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}

/// Read one YAML tier. A missing file is silent; an unreadable or malformed
/// one is skipped with a warning.
fn read_yaml_layer(file: &Path) -> Option<Value> {
    if !file.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Skipping unreadable config file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Skipping malformed config file");
            None
        }
    }
}
