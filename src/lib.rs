//! fold-coord library
//!
//! Task dedup, soft claims and contention-aware work assignment for agents
//! sharing a fold. Exported for the binary and for integration tests.

pub mod cli;
pub mod config;
pub mod coord;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod similarity;
pub mod tools;
pub mod types;
