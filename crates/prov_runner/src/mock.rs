//! Mock process runner for testing.
//!
//! Provides a configurable mock implementation of the [`ProcessRunner`]
//! trait so that engine workflows can be tested without a Terraform binary.
//! Responses are queued per engine subcommand (`version`, `init`, `plan`,
//! `apply`, `show`, `graph`).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::EngineCommand;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, OutputTarget, ProcessRunner, Signals};

/// Predefined mock response for an engine invocation.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    /// Block after writing stdout until interrupted or aborted.
    pub hold_until_interrupt: bool,
    /// Files written into the working directory before exiting.
    pub writes: Vec<(String, Vec<u8>)>,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            hold_until_interrupt: false,
            writes: Vec::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            hold_until_interrupt: false,
            writes: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Keep "running" until a signal arrives, then exit with this
    /// response's exit code.
    pub fn hold_until_interrupt(mut self) -> Self {
        self.hold_until_interrupt = true;
        self
    }

    pub fn writes_file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.writes.push((name.into(), contents.into()));
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub interrupted: bool,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Mock process runner for testing.
///
/// Captures every call and answers from per-subcommand queues. When a
/// queue is empty the runner answers with an empty success.
#[derive(Clone, Default)]
pub struct MockRunner {
    responses: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next invocation of `subcommand`.
    pub fn on(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.responses
            .write()
            .entry(subcommand.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Make every call fail before "spawning".
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, subcommand: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn next_response(&self, subcommand: &str) -> MockResponse {
        self.responses
            .write()
            .get_mut(subcommand)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(
        &self,
        command: &EngineCommand,
        output: OutputTarget,
        signals: &Signals,
    ) -> RunnerResult<ExecutionResult> {
        if let Some(message) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(message));
        }

        let started_at = Utc::now();
        let response = self.next_response(command.subcommand().unwrap_or_default());

        let mut captured = String::new();
        match output {
            OutputTarget::Capture => captured = response.stdout.clone(),
            OutputTarget::Stream(tx) => {
                for line in response.stdout.lines() {
                    let _ = tx.send(line.to_string()).await;
                }
            }
        }

        let mut interrupted = false;
        if response.hold_until_interrupt {
            tokio::select! {
                _ = signals.interrupt.cancelled() => interrupted = true,
                _ = signals.abort.cancelled() => {}
            }
        }

        if let Some(dir) = &command.working_dir {
            for (name, contents) in &response.writes {
                std::fs::write(dir.join(name), contents)?;
            }
        }

        self.captured_calls.write().push(CapturedCall {
            program: command.program.clone(),
            args: command.args.clone(),
            env: command.env.clone(),
            working_dir: command.working_dir.clone(),
            interrupted,
        });

        let finished_at = Utc::now();
        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: captured,
            stderr: response.stderr,
            interrupted,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        })
    }
}
