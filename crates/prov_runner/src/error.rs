//! Error types for the runner module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while supervising an engine process.
///
/// A non-zero exit is not an error at this layer; it is reported through
/// [`crate::ExecutionResult`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program:?}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for {program:?}: {source}")]
    WaitFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Output pipe failed: {0}")]
    Pipe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
