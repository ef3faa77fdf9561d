//! CLI command definitions.
//!
//! Each subcommand maps to one step of the template workflow.

use clap::{Parser, Subcommand};

pub mod compose;
pub mod diagnose;
pub mod resolve;

/// armada - ARM template orchestrator
#[derive(Parser)]
#[command(name = "armada")]
#[command(version, about = "armada - ARM template orchestrator")]
#[command(long_about = r#"
armada composes infrastructure templates contributed by resource plugins,
keeps parameter files per environment, and diagnoses failed deployments.

WORKFLOWS:
  compose   → Compose plugin templates and parameter files (with backup)
  resolve   → Show the resolved parameter payload for an environment
  diagnose  → Reduce a nested deployment error to its root causes

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Composition error
  4 - Parameter error
  5 - Deployment error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compose templates from plugin directories
    Compose(compose::ComposeArgs),

    /// Resolve an environment's parameters (secrets masked)
    Resolve(resolve::ResolveArgs),

    /// Reduce a deployment error document
    Diagnose(diagnose::DiagnoseArgs),
}
