//! # factgraph
//!
//! The command-line binary for the factgraph fact store.
//!
//! ## Usage
//!
//! ```bash
//! # Create a repository in the working directory
//! factgraph init
//!
//! # Digest a document and query it
//! factgraph add -f people.json
//! factgraph query "?id kind user" "?id name ?name"
//! factgraph find --eq kind=project --first
//! factgraph delete _ name Joe
//! ```

use clap::Parser;
use factgraph::cli;
use factgraph::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    let config = match std::env::current_dir()
        .map_err(factgraph_core::FactGraphError::from)
        .and_then(|cwd| Config::load(&cwd))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let settings = config.settings(|name| std::env::var(name).ok());

    // Initialize tracing — FACTGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let default_filter = if cli.verbose {
        "factgraph=debug,factgraph_core=debug"
    } else if cli.quiet {
        "error"
    } else {
        "factgraph=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| match settings.log_filter.as_deref() {
            Some(directives) => tracing_subscriber::EnvFilter::try_new(directives),
            None => tracing_subscriber::EnvFilter::try_new(default_filter),
        })
        .unwrap_or_else(|_| default_filter.into());

    if settings.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Some(path) = config.path() {
        tracing::debug!(path = %path.display(), "loaded config");
    }

    // Execute command
    if let Err(e) = cli::execute(cli, &settings) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
