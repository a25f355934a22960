//! Bounded worker pool for extraction requests.
//!
//! Each request runs as its own task; at most `concurrency` extractions are in
//! flight at once. Nothing is ordered between files.

use crate::error::WorkerError;
use bioformats_filter::{ExtractionOrchestrator, ExtractionOutcome, ExtractionRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Name used in logs (default: `bioformats`).
    pub queue_name: String,
    /// Maximum concurrent extractions (default: 4).
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_name: "bioformats".to_string(),
            concurrency: 4,
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Hands requests to a shared orchestrator on a bounded set of tasks.
pub struct Dispatcher {
    orchestrator: Arc<ExtractionOrchestrator>,
    config: DispatchConfig,
    permits: Arc<Semaphore>,
    tasks: JoinSet<(u64, ExtractionOutcome)>,
}

impl Dispatcher {
    /// A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(orchestrator: Arc<ExtractionOrchestrator>, config: DispatchConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            orchestrator,
            config,
            permits,
            tasks: JoinSet::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of submitted extractions not yet drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Starts `request` once a slot is free. Waits while the pool is full.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Closed` if the pool was shut down.
    pub async fn submit(&mut self, request: ExtractionRequest) -> Result<(), WorkerError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::Closed(self.config.queue_name.clone()))?;

        let orchestrator = Arc::clone(&self.orchestrator);
        let span = tracing::info_span!(
            "extract",
            queue = %self.config.queue_name,
            file_id = request.file_id,
        );
        tracing::debug!(file_id = request.file_id, filename = %request.filename, "dispatching");

        self.tasks.spawn(
            async move {
                let outcome = orchestrator.extract(&request).await;
                drop(permit);
                (request.file_id, outcome)
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Waits for every submitted extraction. Results come back in completion
    /// order; a task that panicked is logged and left out.
    pub async fn drain(&mut self) -> Vec<(u64, ExtractionOutcome)> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(
                    queue = %self.config.queue_name,
                    error = %e,
                    "extraction task panicked"
                ),
            }
        }
        results
    }

    /// Stops accepting work; already running extractions continue.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bftools_adapter::{BfTools, RunResult, ToolError, ToolInvocation, ToolPaths, ToolRunner};
    use bioformats_filter::{MemoryLockStore, MemoryParameterStore, SubOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Slow `showinf` that records the highest number of overlapping runs.
    #[derive(Default)]
    struct Overlap {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ToolRunner for Overlap {
        async fn run(&self, _invocation: &ToolInvocation) -> Result<RunResult, ToolError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let mut report: Vec<String> = (0..11).map(|i| format!("banner {i}")).collect();
            report.push("Width: 64".to_string());
            let report = report.join("\n");
            Ok(RunResult {
                stdout: report.clone(),
                stderr: String::new(),
                combined: report,
                exit_code: 0,
                duration_ms: 30,
            })
        }
    }

    fn orchestrator(runner: Arc<Overlap>, root: &std::path::Path) -> Arc<ExtractionOrchestrator> {
        let paths = ToolPaths {
            showinf: "showinf".into(),
            bfconvert: "bfconvert".into(),
            convert: "convert".into(),
        };
        Arc::new(ExtractionOrchestrator::new(
            BfTools::new(paths, runner),
            Arc::new(MemoryParameterStore::new()),
            Arc::new(MemoryLockStore::new()),
            root,
        ))
    }

    fn tif(file_id: u64) -> ExtractionRequest {
        let name = format!("plate{file_id}.tif");
        ExtractionRequest::new(file_id, name.clone(), 10, format!("/data/{name}"), name)
    }

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert_eq!(config.queue_name, "bioformats");
        assert_eq!(config.concurrency, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(Overlap::default());
        let mut dispatcher = Dispatcher::new(
            orchestrator(runner.clone(), dir.path()),
            DispatchConfig::default().with_concurrency(2),
        );

        for id in 1..=8 {
            dispatcher.submit(tif(id)).await.unwrap();
        }
        let mut results = dispatcher.drain().await;
        results.sort_by_key(|(id, _)| *id);

        assert_eq!(results.len(), 8);
        assert_eq!(results.iter().map(|(id, _)| *id).collect::<Vec<_>>(), (1..=8).collect::<Vec<_>>());
        for (_, outcome) in &results {
            let (metadata, preview) = outcome.sub_outcomes().unwrap();
            assert!(metadata.is_success(), "{metadata:?}");
            assert_eq!(*preview, SubOutcome::Skipped);
        }
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_work() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut dispatcher = Dispatcher::new(
            orchestrator(Arc::new(Overlap::default()), dir.path()),
            DispatchConfig::default(),
        );
        dispatcher.close();
        let err = dispatcher.submit(tif(1)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Closed(ref q) if q == "bioformats"));
        assert!(dispatcher.drain().await.is_empty());
    }
}
