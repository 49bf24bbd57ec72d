//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// contentsync - keep a content tree in sync between environments
#[derive(Parser, Debug)]
#[command(name = "csync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Live database path (default: <root>/live.db)
    #[arg(long, global = true, env = "CONTENTSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Sync root directory (default: nearest .contentsync/)
    #[arg(long, global = true, env = "CONTENTSYNC_ROOT")]
    pub root: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "CONTENTSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a sync root and live database
    Init {
        /// Reinitialize an existing sync root
        #[arg(long)]
        force: bool,
    },

    /// Write the live tree to node files
    Export,

    /// Load node files into the live tree
    Import {
        /// Skip the cross-reference pass
        #[arg(long)]
        no_resolve: bool,
    },

    /// Run the startup sequence (export if needed, import, attach events)
    Start,

    /// Show sync folder and live store status
    Status,

    /// Print the source to target identity table
    Pairs {
        /// Maximum number of pairs to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the audit trail of a live node
    History {
        /// Live node id
        id: i64,

        /// Maximum number of events to print
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Manage live node types
    Type {
        #[command(subcommand)]
        command: TypeCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Type Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TypeCommands {
    /// Register a node type, or replace its property list
    Add {
        /// Type alias
        alias: String,

        /// Register a media type instead of a content type
        #[arg(long)]
        media: bool,

        /// Property alias (repeatable)
        #[arg(short, long = "property")]
        properties: Vec<String>,

        /// Template to register alongside the type
        #[arg(long)]
        template: Option<String>,
    },

    /// List registered node types
    List,
}
