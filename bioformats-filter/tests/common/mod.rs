//! Shared fixtures: a scripted tool runner and instrumented collaborators.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use bftools_adapter::{BfTools, RunResult, ToolError, ToolInvocation, ToolKind, ToolPaths, ToolRunner};
use bioformats_filter::error::{LockError, StoreError};
use bioformats_filter::prelude::*;
use bioformats_filter::types::{ParameterName, ParameterSetId};
use bioformats_filter::{LockStore, ParameterStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const PLANE: &[u8] = b"PLANE";
pub const STRETCHED_PREFIX: &[u8] = b"STRETCHED:";

/// `showinf` output: the 11-line banner followed by `lines`.
pub fn report(lines: &[&str]) -> String {
    let mut out: Vec<String> = (1..=11).map(|i| format!("banner line {i}")).collect();
    out.extend(lines.iter().map(|l| (*l).to_string()));
    out.join("\n")
}

/// Plays the three tools: `showinf` prints a fixed report, `bfconvert` writes
/// [`PLANE`] (even when failing, to leave a partial file), `convert` writes
/// [`STRETCHED_PREFIX`] followed by its input.
pub struct ScriptedRunner {
    report: String,
    delay: Duration,
    failing: HashSet<ToolKind>,
    seen: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            report: report.into(),
            delay: Duration::ZERO,
            failing: HashSet::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, kind: ToolKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, kind: ToolKind) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.kind == kind)
            .count()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<RunResult, ToolError> {
        self.seen.lock().unwrap().push(invocation.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fails = self.failing.contains(&invocation.kind);
        let args = &invocation.args;
        let mut stdout = String::new();
        match invocation.kind {
            ToolKind::Showinf => {
                if !fails {
                    stdout.clone_from(&self.report);
                }
            }
            ToolKind::Bfconvert => {
                let output = PathBuf::from(&args[args.len() - 2]);
                std::fs::write(output, PLANE).unwrap();
            }
            ToolKind::Convert => {
                if !fails {
                    let mut stretched = STRETCHED_PREFIX.to_vec();
                    stretched.extend(std::fs::read(&args[0]).unwrap());
                    std::fs::write(&args[3], stretched).unwrap();
                }
            }
        }

        Ok(RunResult {
            combined: stdout.clone(),
            stdout,
            stderr: String::new(),
            exit_code: i32::from(fails),
            duration_ms: 1,
        })
    }
}

pub fn tools(runner: Arc<ScriptedRunner>) -> BfTools {
    let paths = ToolPaths {
        showinf: "/opt/bftools/showinf".into(),
        bfconvert: "/opt/bftools/bfconvert".into(),
        convert: "/usr/bin/convert".into(),
    };
    BfTools::new(paths, runner)
}

/// Lock store that counts acquisition attempts.
#[derive(Default)]
pub struct CountingLocks {
    pub inner: MemoryLockStore,
    pub attempts: AtomicUsize,
}

impl CountingLocks {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockStore for CountingLocks {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.try_acquire(key, ttl).await
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        self.inner.release(key).await
    }
}

/// Store in which another worker commits a set right after the first
/// existence check.
#[derive(Default)]
pub struct RacingStore {
    pub inner: MemoryParameterStore,
    raced: AtomicBool,
}

#[async_trait]
impl ParameterStore for RacingStore {
    async fn find_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<Option<ParameterSetId>, StoreError> {
        let found = self.inner.find_parameter_set(schema, file_id).await?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.create_parameter_set(schema, file_id).await?;
        }
        Ok(found)
    }

    async fn create_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<ParameterSetId, StoreError> {
        self.inner.create_parameter_set(schema, file_id).await
    }

    async fn parameter_names(&self, schema: &Schema) -> Result<Vec<ParameterName>, StoreError> {
        self.inner.parameter_names(schema).await
    }

    async fn ensure_parameter_name(
        &self,
        schema: &Schema,
        name: &str,
        kind: ParameterKind,
    ) -> Result<ParameterName, StoreError> {
        self.inner.ensure_parameter_name(schema, name, kind).await
    }

    async fn append_parameter(
        &self,
        set: ParameterSetId,
        name: &ParameterName,
        value: ParameterValue,
    ) -> Result<(), StoreError> {
        self.inner.append_parameter(set, name, value).await
    }
}

/// Store whose registry listing is always empty, so planning never sees the
/// names already registered in `inner`.
#[derive(Default)]
pub struct StaleRegistryStore {
    pub inner: MemoryParameterStore,
}

#[async_trait]
impl ParameterStore for StaleRegistryStore {
    async fn find_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<Option<ParameterSetId>, StoreError> {
        self.inner.find_parameter_set(schema, file_id).await
    }

    async fn create_parameter_set(
        &self,
        schema: &Schema,
        file_id: u64,
    ) -> Result<ParameterSetId, StoreError> {
        self.inner.create_parameter_set(schema, file_id).await
    }

    async fn parameter_names(&self, _schema: &Schema) -> Result<Vec<ParameterName>, StoreError> {
        Ok(Vec::new())
    }

    async fn ensure_parameter_name(
        &self,
        schema: &Schema,
        name: &str,
        kind: ParameterKind,
    ) -> Result<ParameterName, StoreError> {
        self.inner.ensure_parameter_name(schema, name, kind).await
    }

    async fn append_parameter(
        &self,
        set: ParameterSetId,
        name: &ParameterName,
        value: ParameterValue,
    ) -> Result<(), StoreError> {
        self.inner.append_parameter(set, name, value).await
    }
}

/// Everything a test needs to drive and inspect one orchestrator.
pub struct Harness {
    pub orchestrator: ExtractionOrchestrator,
    pub runner: Arc<ScriptedRunner>,
    pub store: Arc<MemoryParameterStore>,
    pub locks: Arc<CountingLocks>,
    pub metadata_root: TempDir,
}

impl Harness {
    pub fn new(runner: ScriptedRunner) -> Self {
        Self::with_config(runner, ExtractionConfig::default())
    }

    pub fn with_config(runner: ScriptedRunner, config: ExtractionConfig) -> Self {
        let runner = Arc::new(runner);
        let store = Arc::new(MemoryParameterStore::new());
        let locks = Arc::new(CountingLocks::default());
        let metadata_root = TempDir::new().unwrap();
        let orchestrator = ExtractionOrchestrator::new(
            tools(runner.clone()),
            store.clone(),
            locks.clone(),
            metadata_root.path(),
        )
        .with_config(config);
        Self {
            orchestrator,
            runner,
            store,
            locks,
            metadata_root,
        }
    }
}

/// A request for `/data/exp1/<filename>` stored at `file://store/exp1/<filename>`.
pub fn request(file_id: u64, filename: &str, size_bytes: u64) -> ExtractionRequest {
    ExtractionRequest::new(
        file_id,
        filename,
        size_bytes,
        format!("/data/exp1/{filename}"),
        format!("file://store/exp1/{filename}"),
    )
}
