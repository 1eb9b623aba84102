//! Error types for the session controller.

use std::path::PathBuf;

use thiserror::Error;

use prov_proto::ParameterDestination;

/// Result type alias for session operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that end a session without a completion.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Session stream closed before a start request")]
    StreamClosed,

    #[error("Write statefile {path:?}: {source}")]
    WriteState {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Read file {path:?}: {source}")]
    ReadState {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported parameter type \"{scheme}\" for \"{name}\"")]
    UnsupportedParameter {
        name: String,
        scheme: ParameterDestination,
    },

    #[error("Plan terraform: {0}")]
    PlanFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IaC error: {0}")]
    Iac(#[from] prov_iac::IacError),

    #[error("Protocol error: {0}")]
    Proto(#[from] prov_proto::ProtoError),

    #[error("Runner error: {0}")]
    Runner(#[from] prov_runner::RunnerError),
}
