//! # factgraph CLI Module
//!
//! This module implements the CLI interface for factgraph.
//!
//! ## Available Commands
//!
//! - `init` - Create a repository
//! - `add` - Digest a JSON document into the graph
//! - `get` - Show entities by id
//! - `fetch` - Rebuild the nested structure under an id
//! - `query` - Run a conjunctive query
//! - `find` - Find entities by attribute
//! - `delete` - Delete facts matching a pattern
//! - `facts` - List facts matching a pattern
//! - `status` - Show fact count and location
//! - `clear` - Remove every fact

mod commands;

use crate::config::Settings;
use clap::{Parser, Subcommand};
use factgraph_core::FactGraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// factgraph - a schema-less fact store
///
/// Nested JSON documents are digested into (entity, attribute, value)
/// facts that can be queried, fetched and deleted.
#[derive(Parser, Debug)]
#[command(name = "factgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory holding the repository, or ":memory:"
    #[arg(short = 'L', long, global = true)]
    pub location: Option<String>,

    /// Storage backend: "redb" (repository on disk) or "memory"
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a repository
    Init {
        /// Project directory (defaults to the working directory)
        path: Option<PathBuf>,

        /// Replace an existing repository
        #[arg(short, long)]
        force: bool,
    },

    /// Digest a JSON document into the graph
    Add {
        /// Path to the JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show entities by id
    Get {
        /// Entity ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Rebuild the nested structure under an id
    Fetch {
        /// Entity id
        id: String,
    },

    /// Run a conjunctive query
    Query {
        /// Clauses as "entity attribute value" text, e.g. "?id name ?name"
        #[arg(required = true)]
        clauses: Vec<String>,
    },

    /// Find entities by attribute
    Find {
        /// Attribute the entity must have
        #[arg(long)]
        has: Vec<String>,

        /// Attribute that must equal a value, as attr=value
        #[arg(long)]
        eq: Vec<String>,

        /// Show only the first match
        #[arg(long)]
        first: bool,
    },

    /// Delete facts matching a pattern ("_" is a wildcard)
    Delete {
        entity: String,
        attribute: String,
        value: String,
    },

    /// List facts matching a pattern ("_" is a wildcard)
    Facts {
        #[arg(default_value = "_")]
        entity: String,
        #[arg(default_value = "_")]
        attribute: String,
        #[arg(default_value = "_")]
        value: String,
    },

    /// Show fact count and location
    Status,

    /// Remove every fact
    Clear,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Where to open the graph, after flags and settings are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub location: Option<String>,
    pub backend: Option<String>,
}

impl StoreOptions {
    /// Flags take precedence over settings.
    pub fn resolve(cli: &Cli, settings: &Settings) -> Self {
        Self {
            location: cli.location.clone().or_else(|| settings.location.clone()),
            backend: cli.backend.clone().or_else(|| settings.backend.clone()),
        }
    }
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, settings: &Settings) -> Result<(), FactGraphError> {
    let store = StoreOptions::resolve(&cli, settings);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { path, force }) => cmd_init(path.as_deref(), force, json_mode),
        Some(Commands::Add { file }) => cmd_add(&store, json_mode, &file),
        Some(Commands::Get { ids }) => cmd_get(&store, json_mode, &ids),
        Some(Commands::Fetch { id }) => cmd_fetch(&store, &id),
        Some(Commands::Query { clauses }) => cmd_query(&store, json_mode, &clauses),
        Some(Commands::Find { has, eq, first }) => cmd_find(&store, json_mode, &has, &eq, first),
        Some(Commands::Delete {
            entity,
            attribute,
            value,
        }) => cmd_delete(&store, json_mode, &entity, &attribute, &value),
        Some(Commands::Facts {
            entity,
            attribute,
            value,
        }) => cmd_facts(&store, json_mode, &entity, &attribute, &value),
        Some(Commands::Status) => cmd_status(&store, json_mode),
        Some(Commands::Clear) => cmd_clear(&store),
        None => {
            // No subcommand - show status by default
            cmd_status(&store, json_mode)
        }
    }
}
