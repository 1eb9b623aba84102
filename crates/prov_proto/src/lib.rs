//! # prov_proto
//!
//! Session protocol for the Terraform provisioner.
//!
//! A session is one request/response exchange over a duplex channel: the
//! orchestrator sends a single [`Request::Start`] followed by any number of
//! [`Request::Cancel`] messages, and the provisioner answers with a stream of
//! [`ProvisionResponse::Log`] records closed by at most one
//! [`ProvisionResponse::Complete`].
//!
//! The wire encoding of the transport is not defined here. [`channel`]
//! returns an in-process pair of halves that any transport can pump.
//!
//! # Example
//!
//! ```rust,no_run
//! use prov_proto::{channel, ProvisionRequest, Request};
//!
//! # async fn demo() {
//! let (mut client, stream) = channel(64);
//! // hand `stream` to the provisioner...
//! client.send(Request::Start(ProvisionRequest::new("/tmp/ws"))).await.ok();
//! while let Some(response) = client.recv().await {
//!     println!("{response:?}");
//! }
//! # }
//! ```

pub mod bytes;
pub mod channel;
pub mod error;
pub mod models;

pub use channel::{channel, ProvisionClient, ResponseSender, SessionStream};
pub use error::{ProtoError, ProtoResult};
pub use models::{
    Agent, AgentAuth, Complete, Diagnostic, LogLevel, LogRecord, Metadata, ParameterDestination,
    ParameterValue, ProvisionRequest, ProvisionResponse, Request, Resource, WorkspaceTransition,
};
