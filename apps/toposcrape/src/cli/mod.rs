//! # Toposcrape CLI Module
//!
//! This module implements the CLI interface for Toposcrape.
//!
//! ## Available Commands
//!
//! - `scrape` - Load a dump and print the whole topology
//! - `subgraph` - Print the neighbourhood of one entity
//! - `query` - Print entities (or links) matching a set of predicates

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use toposcrape_core::TopoError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Toposcrape - topology scraping pipeline
///
/// Loads resources and entities from an origin into a weighted graph that
/// can be queried and rendered as DOT or JSON.
#[derive(Parser, Debug)]
#[command(name = "toposcrape")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML config file (defaults to $TOPOSCRAPE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Build an undirected graph regardless of the config file
    #[arg(short, long, global = true)]
    pub undirected: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Rendering of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Graphviz DOT
    Dot,
    /// Canonical graph JSON
    Json,
    /// Node, edge and partial counts
    #[default]
    Summary,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape an origin and print the resulting topology
    Scrape {
        /// Origin URL (file:///path/to/dump.json)
        #[arg(short, long)]
        origin: String,

        /// Route entities through the in-memory broker
        #[arg(short = 'b', long)]
        via_broker: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Print the sub-graph around one entity
    Subgraph {
        /// Origin URL
        #[arg(short, long)]
        origin: String,

        /// Seed entity UID
        #[arg(long)]
        uid: String,

        /// Traversal depth
        #[arg(short, long, default_value = "1")]
        depth: usize,

        /// Follow in-edges as well as out-edges
        #[arg(long)]
        both: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Dot)]
        format: OutputFormat,
    },

    /// Print matching entities as JSON lines
    Query {
        /// Origin URL
        #[arg(short, long)]
        origin: String,

        #[arg(short, long)]
        namespace: Option<String>,

        #[arg(short, long)]
        kind: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        uid: Option<String>,

        /// Match links instead of entities
        #[arg(long)]
        edges: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and return what should be printed.
pub async fn execute(cli: Cli) -> Result<String, TopoError> {
    let config = Config::discover(cli.config.as_deref())?;
    let kind = config.graph_kind(cli.undirected);

    match cli.command {
        Commands::Scrape {
            origin,
            via_broker,
            format,
        } => cmd_scrape(&config, kind, &origin, via_broker, format).await,
        Commands::Subgraph {
            origin,
            uid,
            depth,
            both,
            format,
        } => cmd_subgraph(&config, kind, &origin, &uid, depth, both, format).await,
        Commands::Query {
            origin,
            namespace,
            kind: kind_filter,
            name,
            uid,
            edges,
        } => {
            let filter = QueryFilter {
                namespace,
                kind: kind_filter,
                name,
                uid,
                edges,
            };
            cmd_query(&config, kind, &origin, &filter).await
        }
    }
}
