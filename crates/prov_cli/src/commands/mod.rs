//! CLI command definitions.

use clap::{Parser, Subcommand};

pub mod deps;
pub mod serve;

/// Terraform provisioner - drives Terraform for one workspace session
#[derive(Parser)]
#[command(name = "provisioner")]
#[command(version, about = "Terraform provisioner - drives Terraform for one workspace session")]
#[command(long_about = r#"
Drives Terraform plan/apply for an orchestrator and reports the resulting
resources, the agents they host, and the Terraform state.

COMMANDS:
  serve   → Run one provisioning session over stdin/stdout (JSON lines)
  deps    → Print the direct-dependency map of a `terraform graph` DOT file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  5 - IaC error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve one provisioning session over stdio
    Serve(serve::ServeArgs),

    /// Print direct dependencies from a DOT graph
    Deps(deps::DepsArgs),
}
