//! # prov_iac
//!
//! Terraform driving for the provisioner.
//!
//! This crate runs Terraform subcommands through a [`prov_runner::ProcessRunner`],
//! relays engine output as session logs, and turns plan/state documents plus
//! the rendered dependency graph into correlated resources.
//!
//! ## Features
//!
//! - Version gate (`>= 1.1.0`), init, plan/apply, show and graph commands
//! - Raw and JSON UI log relays
//! - GraphViz DOT parsing into direct-dependency sets
//! - Agent to resource correlation over plan or state
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prov_iac::TerraformRunner;
//! use prov_runner::{ProcessSupervisor, Signals};
//!
//! # async fn run() -> prov_iac::IacResult<()> {
//! let terraform = TerraformRunner::new(Arc::new(ProcessSupervisor::new()), "terraform", "./workspace");
//! let version = terraform.ensure_minimum_version(&Signals::none()).await?;
//! let graph = terraform.graph(&Signals::none()).await?;
//! println!("terraform {} with {} labelled nodes", version, graph.len());
//! # Ok(())
//! # }
//! ```

pub mod correlate;
pub mod error;
pub mod graph;
pub mod logs;
pub mod state;
pub mod terraform;
pub mod version;

pub use correlate::{agents_from_plan, agents_from_state, correlate, AgentTable, DEFAULT_AGENT_RESOURCE_TYPE};
pub use error::{IacError, IacResult};
pub use graph::{find_direct_dependencies, parse_dot, DependencyGraph, DotGraph, DotNode, GraphNode};
pub use logs::{decode_structured_line, spawn_raw_relay, spawn_structured_relay};
pub use state::{PlanOutput, StateOutput, StateResource, StateValues};
pub use terraform::{TerraformRunner, PLAN_FILE_NAME, PLUGIN_CACHE_ENV, STATE_FILE_NAME};
pub use version::{EngineVersion, MINIMUM_TERRAFORM_VERSION};
