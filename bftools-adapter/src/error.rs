use crate::types::ToolKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} executable not found: {message}")]
    ExecutableNotFound { tool: ToolKind, message: String },

    #[error("Failed to spawn process at stage '{stage}': {source}")]
    SpawnFailed {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {elapsed:?} (PID: {pid})")]
    Timeout {
        elapsed: std::time::Duration,
        pid: u32,
        partial_output: String,
    },

    #[error("{stage} exited with code {exit_code}\nOUTPUT: {output}")]
    NonZeroExit {
        stage: String,
        exit_code: i32,
        output: String,
    },

    #[error("Stream task failed at stage '{stage}': {source}")]
    StreamFailed {
        stage: String,
        #[source]
        source: tokio::task::JoinError,
    },

    #[cfg(unix)]
    #[error("Failed to send signal {signal} to PID {pid}: {source}")]
    SignalFailed {
        signal: String,
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Child process stdout was not captured")]
    NoStdout,

    #[error("Child process stderr was not captured")]
    NoStderr,

    #[error("Could not get PID from child process")]
    NoPid,

    #[error("Output truncated: captured {captured_bytes} bytes (limit: {limit_bytes} bytes)")]
    OutputTruncated {
        captured_bytes: usize,
        limit_bytes: usize,
    },

    #[error("Health check failed for {tool}: {message}")]
    Unhealthy { tool: ToolKind, message: String },
}

impl ToolError {
    /// Returns `true` when the tool ran to completion but reported failure.
    #[must_use]
    pub const fn is_non_zero_exit(&self) -> bool {
        matches!(self, Self::NonZeroExit { .. })
    }
}
