//! Tokio-based supervisor for engine child processes.
//!
//! The supervisor spawns the engine with piped output, pumps stdout either
//! into a buffer or line by line into a bounded channel, and races the
//! child's exit against the session's cancellation signals.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::config::EngineCommand;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ExecutionResult, OutputTarget, ProcessRunner, Signals};

/// Runs engine commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for ProcessSupervisor {
    async fn run(
        &self,
        command: &EngineCommand,
        output: OutputTarget,
        signals: &Signals,
    ) -> RunnerResult<ExecutionResult> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        debug!("Executing: {}", command.display());

        let started_at = Utc::now();
        let mut child = cmd.spawn().map_err(|source| RunnerError::SpawnFailed {
            program: command.program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Pipe("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Pipe("stderr was not captured".to_string()))?;

        let stdout_task = tokio::spawn(pump_stdout(stdout, output));
        let stderr_task = tokio::spawn(collect_lines(stderr));

        let (status, interrupted) = wait_with_signals(&mut child, signals)
            .await
            .map_err(|source| RunnerError::WaitFailed {
                program: command.program.clone(),
                source,
            })?;

        let stdout = stdout_task
            .await
            .map_err(|e| RunnerError::Pipe(format!("stdout reader: {}", e)))?;
        let stderr = stderr_task
            .await
            .map_err(|e| RunnerError::Pipe(format!("stderr reader: {}", e)))?;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        if exit_code == 0 {
            info!(
                "{} completed successfully in {}ms",
                command.subcommand().unwrap_or("command"),
                duration_ms
            );
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                command.subcommand().unwrap_or("command"),
                exit_code,
                duration_ms
            );
        }

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            interrupted,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

/// Wait for the child, interrupting at most once and killing on abort.
async fn wait_with_signals(
    child: &mut Child,
    signals: &Signals,
) -> std::io::Result<(ExitStatus, bool)> {
    let mut interrupt_attempted = false;
    let mut interrupted = false;
    let mut killed = false;

    loop {
        tokio::select! {
            biased;
            status = child.wait() => return Ok((status?, interrupted)),
            _ = signals.abort.cancelled(), if !killed => {
                warn!("Session stream closed, killing engine process");
                if let Err(e) = child.start_kill() {
                    debug!("Kill skipped: {}", e);
                }
                killed = true;
            }
            _ = signals.interrupt.cancelled(), if !interrupt_attempted => {
                interrupt_attempted = true;
                interrupted = send_interrupt(child);
                if interrupted {
                    info!("Interrupt sent to engine process");
                }
            }
        }
    }
}

#[cfg(unix)]
fn send_interrupt(child: &mut Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id()` is None once the child has been reaped.
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGINT) {
        Ok(()) => true,
        Err(e) => {
            debug!("Interrupt skipped: {}", e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_interrupt(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

/// Read stdout to EOF, buffering or forwarding each line.
///
/// A gone consumer does not stop the read: the pipe must keep draining
/// or the child blocks on write.
async fn pump_stdout<R>(reader: R, output: OutputTarget) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut captured = String::new();
    let mut sender = match output {
        OutputTarget::Capture => None,
        OutputTarget::Stream(tx) => Some(tx),
    };
    let capture = sender.is_none();

    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                if capture {
                    captured.push_str(&line);
                    captured.push('\n');
                } else if let Some(tx) = &sender {
                    if tx.send(line).await.is_err() {
                        debug!("Stdout consumer gone, draining remaining output");
                        sender = None;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading engine stdout: {}", e);
                break;
            }
        }
    }
    captured
}

async fn collect_lines<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = String::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading engine stderr: {}", e);
                break;
            }
        }
    }
    collected
}

/// Next line without its terminator. Invalid UTF-8 is replaced, not fatal.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
