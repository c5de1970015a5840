//! Configuration loading.
//!
//! Three file tiers (embedded defaults, project `.fold-coord/`, user
//! `~/.fold-coord/`) are deep-merged field by field, then environment
//! variables apply:
//! - `FOLD_COORD_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `FOLD_COORD_DB_PATH` - Database path
//! - `FOLD_COORD_FOLD` - Fold (workspace) id
//! - `FOLD_COORD_USER` - Base user name
//! - `FOLD_COORD_USER_DIR` / `FOLD_COORD_PROJECT_DIR` - Tier directories

mod loader;
mod merge;
mod types;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, ENV_CONFIG_PATH, ENV_DB_PATH, ENV_FOLD, ENV_PROJECT_DIR,
    ENV_USER, ENV_USER_DIR,
};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
