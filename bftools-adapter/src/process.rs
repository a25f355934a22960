//! Subprocess execution and lifecycle management for the external tools.

use crate::error::ToolError;
use crate::types::{RunResult, ToolInvocation};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

const CHANNEL_CAPACITY: usize = 100;
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024; // 10 MB
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Executes a [`ToolInvocation`]. The seam the pipeline is tested through.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs the invocation to completion and returns its captured output.
    ///
    /// A non-zero exit code is reported through [`RunResult::exit_code`], not as an error.
    async fn run(&self, invocation: &ToolInvocation) -> Result<RunResult, ToolError>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<RunResult, ToolError> {
        run_tool(invocation).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamSource {
    Stdout,
    Stderr,
}

struct OutputLine {
    source: StreamSource,
    text: String,
}

/// Output accumulated so far, per stream and merged.
#[derive(Default)]
struct Collected {
    stdout: Vec<String>,
    stderr: Vec<String>,
    combined: Vec<String>,
    stdout_bytes: usize,
    stderr_bytes: usize,
}

impl Collected {
    fn push(&mut self, line: OutputLine) -> Result<(), ToolError> {
        let (lines, bytes) = match line.source {
            StreamSource::Stdout => (&mut self.stdout, &mut self.stdout_bytes),
            StreamSource::Stderr => (&mut self.stderr, &mut self.stderr_bytes),
        };

        *bytes += line.text.len();
        if *bytes > MAX_OUTPUT_BYTES {
            return Err(ToolError::OutputTruncated {
                captured_bytes: *bytes,
                limit_bytes: MAX_OUTPUT_BYTES,
            });
        }

        lines.push(line.text.clone());
        self.combined.push(line.text);
        Ok(())
    }
}

/// Spawns the tool, waits for it to exit and collects merged output.
///
/// Without a timeout this waits for as long as the tool runs. With one, the
/// child receives `SIGTERM` when the limit is hit, then `SIGKILL` after a grace
/// period.
///
/// # Errors
/// Returns a [`ToolError`] if the process cannot be spawned, times out,
/// produces more output than the capture limit, or encounters an I/O failure.
pub async fn run_tool(invocation: &ToolInvocation) -> Result<RunResult, ToolError> {
    tracing::debug!(
        tool = %invocation.kind,
        command = %invocation.display_command(),
        "running external tool"
    );
    let start_time = Instant::now();

    let mut child = spawn_child(invocation)?;

    let stdout = child.stdout.take().ok_or(ToolError::NoStdout)?;
    let stderr = child.stderr.take().ok_or(ToolError::NoStderr)?;
    let pid = child.id().ok_or(ToolError::NoPid)?;

    let (tx, rx) = mpsc::channel::<OutputLine>(CHANNEL_CAPACITY);
    let mut tasks = JoinSet::new();
    tasks.spawn(forward_lines(stdout, StreamSource::Stdout, tx.clone()));
    tasks.spawn(forward_lines(stderr, StreamSource::Stderr, tx));

    let mut collected = Collected::default();
    let collection = collect_output(&mut child, &mut tasks, rx, &mut collected);

    // `None` means the limit elapsed before the tool exited.
    let outcome = match invocation.timeout {
        Some(limit) => timeout(limit, collection).await.ok(),
        None => Some(collection.await),
    };

    let Some(outcome) = outcome else {
        let elapsed = start_time.elapsed();
        tracing::warn!(tool = %invocation.kind, pid, ?elapsed, "tool timed out, terminating");
        if let Err(e) = graceful_shutdown(&mut child, pid).await {
            tracing::warn!(tool = %invocation.kind, pid, error = %e, "shutdown after timeout failed");
        }
        tasks.abort_all();
        return Err(ToolError::Timeout {
            elapsed,
            pid,
            partial_output: collected.combined.join("\n"),
        });
    };

    let status = match outcome {
        Ok(status) => status,
        Err(e) => {
            let _ = child.start_kill();
            tasks.abort_all();
            return Err(e);
        }
    };

    let duration = start_time.elapsed();
    let result = RunResult {
        stdout: collected.stdout.join("\n"),
        stderr: collected.stderr.join("\n"),
        combined: collected.combined.join("\n"),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    };

    tracing::debug!(
        tool = %invocation.kind,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        "external tool finished"
    );

    Ok(result)
}

/// Spawns the child process with piped stdout/stderr and no stdin.
fn spawn_child(invocation: &ToolInvocation) -> Result<Child, ToolError> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(ref dir) = invocation.cwd {
        cmd.current_dir(dir);
    }

    cmd.spawn().map_err(|e| ToolError::SpawnFailed {
        stage: format!("spawn {}", invocation.kind),
        source: e,
    })
}

/// Reads a stream line by line and forwards each line, lossily decoded, to the collector.
async fn forward_lines(
    stream: impl AsyncRead + Unpin + Send + 'static,
    source: StreamSource,
    tx: mpsc::Sender<OutputLine>,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                let text = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(OutputLine { source, text }).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Drains the merged channel until both readers finish, then waits for the child.
async fn collect_output(
    child: &mut Child,
    tasks: &mut JoinSet<()>,
    mut rx: mpsc::Receiver<OutputLine>,
    collected: &mut Collected,
) -> Result<ExitStatus, ToolError> {
    while let Some(line) = rx.recv().await {
        collected.push(line)?;
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| ToolError::StreamFailed {
            stage: "join".to_string(),
            source: e,
        })?;
    }

    child.wait().await.map_err(|e| ToolError::SpawnFailed {
        stage: "wait".to_string(),
        source: e,
    })
}

/// Graceful shutdown: `SIGTERM`, wait grace period, then `SIGKILL`.
#[cfg(unix)]
async fn graceful_shutdown(child: &mut Child, pid: u32) -> Result<(), ToolError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).map_err(|_| ToolError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        source: nix::errno::Errno::ESRCH,
    })?;

    signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM).map_err(|e| {
        ToolError::SignalFailed {
            signal: "SIGTERM".to_string(),
            pid,
            source: e,
        }
    })?;

    match timeout(GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_status)) => Ok(()),
        Ok(Err(e)) => Err(ToolError::SpawnFailed {
            stage: "graceful_shutdown wait".to_string(),
            source: e,
        }),
        Err(_) => {
            child.kill().await.map_err(|e| ToolError::SpawnFailed {
                stage: "SIGKILL".to_string(),
                source: e,
            })?;
            child.wait().await.map_err(|e| ToolError::SpawnFailed {
                stage: "post-SIGKILL wait".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }
}

/// Windows: immediate termination, no graceful shutdown for console processes.
#[cfg(windows)]
async fn graceful_shutdown(child: &mut Child, _pid: u32) -> Result<(), ToolError> {
    child.kill().await.map_err(|e| ToolError::SpawnFailed {
        stage: "TerminateProcess".to_string(),
        source: e,
    })?;
    child.wait().await.map_err(|e| ToolError::SpawnFailed {
        stage: "post-kill wait".to_string(),
        source: e,
    })?;
    Ok(())
}
