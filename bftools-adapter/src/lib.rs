//! Rust adapter for driving the Bio-Formats command-line tools (`showinf`,
//! `bfconvert`) and ImageMagick `convert` as subprocesses.
//!
//! Arguments are always passed as a structured list; nothing is interpreted
//! by a shell.

/// Command-line argument construction for each tool.
pub mod cmd;
/// Discovery and resolution of the tool executables.
pub mod discovery;
/// Error types returned by adapter operations.
pub mod error;
/// Subprocess execution with merged output capture and optional timeouts.
pub mod process;
/// Shared data types for configuration, invocations and results.
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use discovery::{discover_all, discover_tool};
pub use error::ToolError;
pub use process::{run_tool, ProcessRunner, ToolRunner};
pub use types::*;

/// High-level client for the three external tools.
#[derive(Clone)]
pub struct BfTools {
    /// Resolved executable locations.
    pub paths: ToolPaths,
    runner: Arc<dyn ToolRunner>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for BfTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BfTools")
            .field("paths", &self.paths)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BfTools {
    /// Creates a client from resolved paths and a runner.
    #[must_use]
    pub fn new(paths: ToolPaths, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            paths,
            runner,
            timeout: None,
        }
    }

    /// Discovers every binary and runs them as real child processes.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::ExecutableNotFound` if any binary cannot be located.
    pub fn discover(overrides: &ToolPathOverrides) -> Result<Self, ToolError> {
        let paths = discover_all(overrides)?;
        Ok(Self::new(paths, Arc::new(ProcessRunner)))
    }

    /// Applies a per-invocation timeout. `None` lets a hung tool block forever.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn invocation(&self, kind: ToolKind, args: Vec<std::ffi::OsString>) -> ToolInvocation {
        ToolInvocation::new(kind, self.paths.get(kind).clone(), args).with_timeout(self.timeout)
    }

    async fn run_checked(
        &self,
        kind: ToolKind,
        args: Vec<std::ffi::OsString>,
    ) -> Result<RunResult, ToolError> {
        let invocation = self.invocation(kind, args);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            tracing::warn!(
                tool = %kind,
                exit_code = result.exit_code,
                command = %invocation.display_command(),
                "external tool reported failure"
            );
        }
        result.into_success(kind.binary_name())
    }

    /// Runs `showinf <input> -nopix` and returns the report.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NonZeroExit` when `showinf` fails, or a spawn/I/O error.
    pub async fn dump_metadata(&self, input: &Path) -> Result<RunResult, ToolError> {
        self.run_checked(ToolKind::Showinf, cmd::showinf_args(input))
            .await
    }

    /// Converts the first series/timepoint/channel/z plane of `input` to `output`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NonZeroExit` when `bfconvert` fails, or a spawn/I/O error.
    pub async fn extract_plane(&self, input: &Path, output: &Path) -> Result<RunResult, ToolError> {
        self.run_checked(ToolKind::Bfconvert, cmd::bfconvert_args(input, output))
            .await
    }

    /// Writes a full-range contrast-stretched copy of `input` to `output`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NonZeroExit` when `convert` fails, or a spawn/I/O error.
    pub async fn contrast_stretch(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<RunResult, ToolError> {
        self.run_checked(ToolKind::Convert, cmd::contrast_stretch_args(input, output))
            .await
    }

    /// Checks that every tool starts and answers a version probe.
    ///
    /// # Errors
    /// Returns `ToolError::Unhealthy` naming the first tool that fails its probe.
    pub async fn check_health(&self) -> Result<(), ToolError> {
        for kind in [ToolKind::Showinf, ToolKind::Bfconvert, ToolKind::Convert] {
            let invocation = self.invocation(kind, cmd::version_args());
            match self.runner.run(&invocation).await {
                Ok(result) if result.success() => {
                    let version = result.combined.lines().next().unwrap_or_default();
                    tracing::debug!(tool = %kind, version, "tool healthy");
                }
                Ok(result) => {
                    return Err(ToolError::Unhealthy {
                        tool: kind,
                        message: format!("version probe exited with {}", result.exit_code),
                    });
                }
                Err(e) => {
                    return Err(ToolError::Unhealthy {
                        tool: kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records invocations and answers each with a fixed exit code.
    struct Recorder {
        exit_code: i32,
        seen: Mutex<Vec<ToolInvocation>>,
    }

    #[async_trait]
    impl ToolRunner for Recorder {
        async fn run(&self, invocation: &ToolInvocation) -> Result<RunResult, ToolError> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(RunResult {
                stdout: "Version: 7.0.0".to_string(),
                stderr: String::new(),
                combined: "Version: 7.0.0".to_string(),
                exit_code: self.exit_code,
                duration_ms: 1,
            })
        }
    }

    fn tools(exit_code: i32) -> (BfTools, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            exit_code,
            seen: Mutex::new(Vec::new()),
        });
        let paths = ToolPaths {
            showinf: PathBuf::from("/bf/showinf"),
            bfconvert: PathBuf::from("/bf/bfconvert"),
            convert: PathBuf::from("/usr/bin/convert"),
        };
        (BfTools::new(paths, recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn test_dump_metadata_uses_showinf_path() {
        let (tools, recorder) = tools(0);
        tools.dump_metadata(Path::new("/d/a.ims")).await.unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].program, PathBuf::from("/bf/showinf"));
        assert_eq!(seen[0].kind, ToolKind::Showinf);
    }

    #[tokio::test]
    async fn test_failed_tool_becomes_non_zero_exit() {
        let (tools, _) = tools(1);
        let err = tools
            .extract_plane(Path::new("/d/a.lif"), Path::new("/o/a.lif.png"))
            .await
            .unwrap_err();
        assert!(err.is_non_zero_exit(), "got {err}");
    }

    #[tokio::test]
    async fn test_timeout_is_forwarded_to_invocations() {
        let (tools, recorder) = tools(0);
        let tools = tools.with_timeout(Some(Duration::from_secs(9)));
        tools
            .contrast_stretch(Path::new("in"), Path::new("out"))
            .await
            .unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(9)));
    }

    #[tokio::test]
    async fn test_check_health_probes_all_tools() {
        let (tools, recorder) = tools(0);
        tools.check_health().await.unwrap();
        let kinds: Vec<ToolKind> = recorder.seen.lock().unwrap().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![ToolKind::Showinf, ToolKind::Bfconvert, ToolKind::Convert]
        );
    }

    #[tokio::test]
    async fn test_check_health_reports_failing_tool() {
        let (tools, _) = tools(2);
        match tools.check_health().await.unwrap_err() {
            ToolError::Unhealthy { tool, .. } => assert_eq!(tool, ToolKind::Showinf),
            other => panic!("unexpected error: {other}"),
        }
    }
}
