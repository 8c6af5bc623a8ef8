//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Code context engine: incremental indexing, dependency graphs, and
/// ranked context assembly
#[derive(Parser, Debug)]
#[command(name = "ctx-engine")]
#[command(about = "Indexes a project and assembles ranked, token-budgeted context for queries")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a project directory
    #[command(visible_alias = "i")]
    Index(IndexArgs),

    /// Assemble context for a query against an indexed project
    #[command(visible_alias = "q")]
    Query(QueryArgs),

    /// Report dependency graph diagnostics
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// Show index and cache statistics
    Stats(StatsArgs),
}

/// Arguments for the index command
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Project root to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Print per-file progress to stderr
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Project root to index and query
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Query text
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of files in the assembled context
    #[arg(long, value_name = "N", default_value = "10")]
    pub max_files: usize,

    /// Token budget for the assembled context
    #[arg(long, value_name = "N", default_value = "8000")]
    pub max_tokens: usize,

    /// Treat this file as the active file (highest priority)
    #[arg(long, value_name = "PATH")]
    pub current_file: Option<String>,

    /// Also print a context quality assessment
    #[arg(long)]
    pub quality: bool,
}

/// Arguments for the graph command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Project root to index and analyze
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Report import cycles
    #[arg(long)]
    pub cycles: bool,

    /// Report the N most depended-upon files
    #[arg(long, value_name = "N", default_value = "10")]
    pub critical: usize,
}

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Project root to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}
