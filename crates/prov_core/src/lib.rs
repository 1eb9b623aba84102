//! # prov_core
//!
//! Session controller for the Terraform provisioner.
//!
//! A [`Provisioner`] takes the provisioner half of a session
//! ([`prov_proto::SessionStream`]), drives Terraform through init and
//! plan/apply, relays engine output as logs, and finishes with one
//! `Complete` response describing the resources and their agents.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prov_core::{Provisioner, ProvisionerConfig};
//! use prov_proto::{channel, ProvisionRequest, Request};
//! use prov_runner::ProcessSupervisor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = Provisioner::new(ProvisionerConfig::default(), Arc::new(ProcessSupervisor::new()));
//! let (mut client, stream) = channel(64);
//!
//! let session = tokio::spawn(async move { provisioner.provision(stream).await });
//! client.send(Request::Start(ProvisionRequest::new("./workspace").dry_run())).await?;
//! while let Some(response) = client.recv().await {
//!     println!("{:?}", response);
//! }
//! session.await??;
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod config;
pub mod env;
pub mod error;
pub mod session;

pub use completion::CompletionBuilder;
pub use config::ProvisionerConfig;
pub use env::{compose_environment, AgentScriptEnv, SessionEnv, StaticAgentScripts};
pub use error::{CoreError, CoreResult};
pub use session::Provisioner;
