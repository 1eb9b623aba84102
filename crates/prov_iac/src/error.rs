//! Error types for IaC module.

use thiserror::Error;

use crate::version::EngineVersion;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while driving Terraform.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Get terraform version: {0}")]
    Version(String),

    #[error("terraform version \"{found}\" is too old. required >= \"{required}\"")]
    VersionTooOld {
        found: EngineVersion,
        required: EngineVersion,
    },

    #[error("Initialize terraform: {0}")]
    InitFailed(String),

    #[error("Show {target}: {message}")]
    ShowFailed { target: String, message: String },

    #[error("Graph: {0}")]
    GraphFailed(String),

    #[error("Parse graph at {line}:{column}: {message}")]
    GraphParse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Decode agent attributes for {address}: {source}")]
    AgentDecode {
        address: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Decode {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Runner error: {0}")]
    Runner(#[from] prov_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
