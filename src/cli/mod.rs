//! CLI command definitions for fold-coord.
//!
//! With no subcommand the binary runs the MCP server on stdio. The other
//! subcommands print the same views the tools return, for humans.

use clap::{Parser, Subcommand};

/// Fold coordination MCP server and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Fold (workspace) every read and write is scoped to
    #[arg(short, long, global = true)]
    pub fold: Option<String>,

    /// Agent identity (default: <user>/<petname>)
    #[arg(short, long, env = "FOLD_COORD_AGENT", global = true)]
    pub agent: Option<String>,

    /// Base user name (default: config, then $USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Session id (default: a fresh UUIDv7)
    #[arg(short, long, env = "FOLD_COORD_SESSION", global = true)]
    pub session: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default if no subcommand given)
    Serve,

    /// Show every agent's active claim in the fold
    Claims,

    /// List tasks in the fold
    Tasks {
        /// Include done tasks
        #[arg(long)]
        all: bool,
    },

    /// Show open tasks, uncontested first
    Available {
        /// Only tasks at least this urgent
        #[arg(short, long)]
        priority: Option<String>,

        /// Milestone contains this text
        #[arg(short, long)]
        milestone: Option<String>,
    },
}
