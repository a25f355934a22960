//! Command-line host: extracts metadata and previews for local files.

use anyhow::Context;
use bftools_adapter::BfTools;
use bioformats_filter::{
    DatafileRecord, ExtractionOrchestrator, ExtractionRequest, LocalStorage, MemoryLockStore,
    MemoryParameterStore, PreviewStorage, StorageResolver,
};
use bioformats_worker::{Dispatcher, WorkerConfig};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extracts metadata and previews, printing one JSON outcome per file
    Extract {
        /// Image files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum concurrent extractions
        #[arg(long)]
        concurrency: Option<usize>,
        /// Root that every file must live under; locations are recorded relative to it
        #[arg(long)]
        data_root: Option<PathBuf>,
        /// Root under which previews are written
        #[arg(long)]
        metadata_root: Option<PathBuf>,
        /// Store previews as base64 instead of writing them to disk
        #[arg(long)]
        inline_preview: bool,
    },
    /// Checks that showinf, bfconvert and convert can be run
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };

    match cli.command {
        Commands::Check => {
            let tools = BfTools::discover(&config.tools)?;
            tools.check_health().await?;
            tracing::info!(paths = ?tools.paths, "all tools healthy");
        }
        Commands::Extract {
            files,
            concurrency,
            data_root,
            metadata_root,
            inline_preview,
        } => {
            if let Some(n) = concurrency {
                config.dispatch.concurrency = n;
            }
            if let Some(root) = data_root {
                config.data_root = root;
            }
            if let Some(root) = metadata_root {
                config.metadata_root = root;
            }
            if inline_preview {
                config.extraction.preview_storage = PreviewStorage::Inline;
            }
            run_extract(config, files).await?;
        }
    }

    Ok(())
}

async fn run_extract(config: WorkerConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let tools = BfTools::discover(&config.tools).context("locating bftools and ImageMagick")?;
    if let Err(e) = tools.check_health().await {
        tracing::warn!(error = %e, "tool health check failed, continuing");
    }

    let mut storage = config.storage();
    storage.data_root = tokio::fs::canonicalize(&storage.data_root)
        .await
        .with_context(|| format!("resolving data root {}", storage.data_root.display()))?;
    let orchestrator = Arc::new(
        ExtractionOrchestrator::new(
            tools,
            Arc::new(MemoryParameterStore::new()),
            Arc::new(MemoryLockStore::new()),
            storage.metadata_root(),
        )
        .with_config(config.extraction.clone()),
    );
    let mut dispatcher = Dispatcher::new(orchestrator, config.dispatch.clone());

    let mut names = HashMap::new();
    for (file_id, file) in (1_u64..).zip(files) {
        let request = match build_request(file_id, &file, &storage).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping file");
                continue;
            }
        };
        names.insert(file_id, file);
        dispatcher.submit(request).await?;
    }

    let mut results = dispatcher.drain().await;
    results.sort_by_key(|(file_id, _)| *file_id);
    for (file_id, outcome) in results {
        let line = serde_json::json!({
            "file_id": file_id,
            "file": names.get(&file_id).map(|p| p.display().to_string()),
            "outcome": outcome,
        });
        println!("{line}");
    }
    Ok(())
}

/// Records a file by its location relative to the data root and resolves it
/// back through the storage layer, as a host database would.
async fn build_request(
    file_id: u64,
    file: &Path,
    storage: &LocalStorage,
) -> anyhow::Result<ExtractionRequest> {
    let path = tokio::fs::canonicalize(file)
        .await
        .with_context(|| format!("resolving {}", file.display()))?;
    let size = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("reading size of {}", path.display()))?
        .len();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let uri = path
        .strip_prefix(&storage.data_root)
        .with_context(|| {
            format!(
                "{} is outside the data root {}",
                path.display(),
                storage.data_root.display()
            )
        })?
        .to_string_lossy()
        .into_owned();

    let record = DatafileRecord {
        id: file_id,
        filename,
        size,
        uri,
    };
    ExtractionRequest::from_record(&record, storage)
        .with_context(|| format!("resolving {}", record.uri))
}
