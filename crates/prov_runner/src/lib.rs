//! # prov_runner
//!
//! Engine subprocess supervision for the Terraform provisioner.
//!
//! This crate runs the engine binary as a child process with a fully
//! specified argument list, environment and working directory, and
//! guarantees the child is interruptible.
//!
//! # Features
//!
//! - **Streaming stdout**: lines are pushed into a bounded channel that is
//!   closed at EOF, so consumers can await their own completion
//! - **Cooperative cancellation**: an interrupt token delivers SIGINT at most
//!   once; an abort token kills the child when the transport is gone
//! - **Mock Runner**: for testing without a Terraform binary
//!
//! # Example
//!
//! ```rust,no_run
//! use prov_runner::{EngineCommand, OutputTarget, ProcessRunner, ProcessSupervisor, Signals};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supervisor = ProcessSupervisor::new();
//!     let command = EngineCommand::new("terraform")
//!         .args(["version", "-json"])
//!         .working_dir("/tmp");
//!
//!     let result = supervisor
//!         .run(&command, OutputTarget::Capture, &Signals::none())
//!         .await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod runner;
pub mod supervisor;

pub use config::EngineCommand;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{ExecutionResult, LineSender, OutputTarget, ProcessRunner, Signals};
pub use supervisor::ProcessSupervisor;
