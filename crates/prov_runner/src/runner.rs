//! Process runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineCommand;
use crate::error::RunnerResult;

/// Sender side of a line-oriented stdout pipe.
pub type LineSender = mpsc::Sender<String>;

/// Where the child's stdout goes.
#[derive(Debug)]
pub enum OutputTarget {
    /// Buffer everything into [`ExecutionResult::stdout`].
    Capture,
    /// Forward each line; the sender is dropped when the pipe closes.
    Stream(LineSender),
}

/// Cancellation signals observed while a child runs.
///
/// `interrupt` asks the child to shut down gracefully (SIGINT), `abort`
/// means the session's transport is gone and the child is killed.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub interrupt: CancellationToken,
    pub abort: CancellationToken,
}

impl Signals {
    pub fn new(interrupt: CancellationToken, abort: CancellationToken) -> Self {
        Self { interrupt, abort }
    }

    /// Signals that only react to the transport going away.
    pub fn abort_only(abort: CancellationToken) -> Self {
        Self {
            interrupt: CancellationToken::new(),
            abort,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Result of running an engine command to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code, or -1 when the child was terminated by a signal
    pub exit_code: i64,
    /// Captured stdout (empty when streamed)
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Whether an interrupt was delivered to the child
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Failure description: exit status plus the last stderr line.
    pub fn error_message(&self) -> String {
        let status = if self.exit_code < 0 {
            "terminated by signal".to_string()
        } else {
            format!("exit status {}", self.exit_code)
        };
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => format!("{}: {}", status, line.trim()),
            None => status,
        }
    }
}

/// Runs engine commands as child processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` until it exits, honoring `signals`.
    async fn run(
        &self,
        command: &EngineCommand,
        output: OutputTarget,
        signals: &Signals,
    ) -> RunnerResult<ExecutionResult>;
}
