//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Quay - a declarative build graph for native C/C++ targets
#[derive(Parser)]
#[command(name = "quay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to Quay.toml (defaults to searching upward from cwd)
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the descriptor and print the build order
    Check(CheckArgs),

    /// Print the build plan
    Plan(PlanArgs),

    /// Build every target
    Build(BuildArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Propagate defines from internal dependencies
    #[arg(long)]
    pub transitive_defines: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Propagate defines from internal dependencies
    #[arg(long)]
    pub transitive_defines: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Number of parallel jobs
    #[arg(short, long, env = "QUAY_JOBS")]
    pub jobs: Option<usize>,

    /// Output directory, relative to the descriptor's directory
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Propagate defines from internal dependencies
    #[arg(long)]
    pub transitive_defines: bool,

    /// Output format for build messages
    #[arg(long, value_enum)]
    pub message_format: Option<MessageFormat>,
}

/// Build message format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// Status lines on stderr
    Human,
    /// One JSON event per line on stdout
    Json,
}
