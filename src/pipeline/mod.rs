//! Concurrent ingestion of a documentation tree.
//!
//! A run walks the root, hands each file to a bounded pool of workers that
//! read, parse and chunk it, and funnels every outcome through one
//! aggregator task. The aggregator is the only writer of the run's state;
//! readers take a short read lock to snapshot it.

mod discovery;
pub mod error;
mod loader;
mod run;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunker::{chunk_document, ChunkConfig, DEFAULT_OVERLAP, DEFAULT_TARGET_SIZE};
use crate::parser::{parse_markdown_bytes, relative_path, ParseError};

pub use discovery::{discover, preflight, Discovery};
pub use error::{DiscoveryError, DocumentError, IngestError};
pub use loader::{DocumentLoader, FsLoader};
pub use run::{ChunkPage, IngestionRun, RunHandle, RunId, RunState, RunStatus};

use run::{DocumentOutcome, RunEvent, RunShared};

const MAX_DEFAULT_WORKERS: usize = 16;

/// Worker limit used when none is configured.
pub fn default_worker_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
        .min(MAX_DEFAULT_WORKERS)
}

pub fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "mdx".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub target_size: usize,
    pub overlap: usize,
    pub worker_limit: usize,
    /// File extensions to ingest, without the dot
    pub extensions: Vec<String>,
    /// Follow symbolic links while walking the root
    #[serde(default)]
    pub follow_links: bool,
}

impl IngestionConfig {
    pub fn new(target_size: usize, overlap: usize, worker_limit: usize) -> Self {
        Self {
            target_size,
            overlap,
            worker_limit,
            extensions: default_extensions(),
            follow_links: false,
        }
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig::new(self.target_size, self.overlap)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.chunk_config().validate()?;
        if self.worker_limit == 0 {
            return Err(IngestError::ZeroWorkerLimit);
        }
        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SIZE, DEFAULT_OVERLAP, default_worker_limit())
    }
}

/// Registry of ingestion runs, addressed by [`RunId`].
///
/// Runs stay registered until [`Pipeline::forget`] drops them or, with
/// [`Pipeline::with_max_runs`], until newer runs push finished ones out.
#[derive(Clone)]
pub struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    runs: Arc<RwLock<HashMap<RunId, RunHandle>>>,
    max_runs: Option<usize>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(FsLoader))
    }

    pub fn with_loader(loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            loader,
            runs: Arc::new(RwLock::new(HashMap::new())),
            max_runs: None,
        }
    }

    /// Keep at most `max_runs` runs; the oldest finished runs are evicted
    /// first. Runs still in progress are never evicted.
    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    /// Validate, check the root and start a run in the background.
    ///
    /// Configuration and root problems are returned here, before a handle
    /// exists. Everything after that is reported through the handle.
    pub async fn start_ingestion(
        &self,
        root: impl AsRef<Path>,
        config: IngestionConfig,
    ) -> Result<RunHandle, IngestError> {
        let root = root.as_ref().to_path_buf();
        config.validate()?;
        preflight(&root)?;

        let run = IngestionRun::new(Uuid::new_v4(), root.clone(), config.clone());
        let handle = RunHandle::new(run);
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), handle.clone());
        self.evict_finished();

        info!(
            "Starting ingestion run {} over {} (target {}, overlap {}, {} workers)",
            handle.id(),
            root.display(),
            config.target_size,
            config.overlap,
            config.worker_limit
        );
        tokio::spawn(drive(handle.clone(), root, config, self.loader.clone()));

        Ok(handle)
    }

    pub fn run(&self, run_id: RunId) -> Result<RunHandle, IngestError> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
            .ok_or(IngestError::UnknownRun(run_id))
    }

    pub fn get_status(&self, run_id: RunId) -> Result<RunStatus, IngestError> {
        Ok(self.run(run_id)?.status())
    }

    pub fn get_chunks(&self, run_id: RunId, limit: usize, offset: usize) -> Result<ChunkPage, IngestError> {
        Ok(self.run(run_id)?.chunks(limit, offset))
    }

    pub fn get_errors(&self, run_id: RunId) -> Result<BTreeMap<String, String>, IngestError> {
        Ok(self.run(run_id)?.errors())
    }

    pub fn cancel(&self, run_id: RunId) -> Result<(), IngestError> {
        self.run(run_id)?.cancel();
        Ok(())
    }

    pub async fn wait(&self, run_id: RunId) -> Result<RunStatus, IngestError> {
        let handle = self.run(run_id)?;
        Ok(handle.wait().await)
    }

    /// Drop a finished run and its chunks from the registry.
    ///
    /// Handles already given out keep working.
    pub fn forget(&self, run_id: RunId) -> Result<RunHandle, IngestError> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let handle = runs.get(&run_id).ok_or(IngestError::UnknownRun(run_id))?;
        if !handle.status().status.is_terminal() {
            return Err(IngestError::RunInProgress(run_id));
        }
        runs.remove(&run_id).ok_or(IngestError::UnknownRun(run_id))
    }

    /// Status of every known run, oldest first.
    pub fn runs(&self) -> Vec<RunStatus> {
        self.ordered_runs()
            .into_iter()
            .map(|(_, status)| status)
            .collect()
    }

    fn ordered_runs(&self) -> Vec<(chrono::DateTime<chrono::Utc>, RunStatus)> {
        let mut runs: Vec<_> = self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(RunHandle::summary)
            .collect();
        runs.sort_by_key(|(started_at, status)| (*started_at, status.run_id));
        runs
    }

    fn evict_finished(&self) {
        let Some(max_runs) = self.max_runs else {
            return;
        };
        let ordered = self.ordered_runs();
        let mut excess = ordered.len().saturating_sub(max_runs);
        if excess == 0 {
            return;
        }

        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        for (_, status) in ordered {
            if excess == 0 {
                break;
            }
            if status.status.is_terminal() {
                debug!("Evicting finished run {}", status.run_id);
                runs.remove(&status.run_id);
                excess -= 1;
            }
        }
    }
}

/// Run the dispatcher and the aggregator for one run to completion.
async fn drive(handle: RunHandle, root: PathBuf, config: IngestionConfig, loader: Arc<dyn DocumentLoader>) {
    let (tx, rx) = mpsc::channel(config.worker_limit * 2);
    let aggregator = tokio::spawn(aggregate(handle.shared.clone(), rx));

    dispatch(&handle, root, &config, loader, tx).await;

    if let Err(e) = aggregator.await {
        error!("Aggregator for run {} stopped: {}", handle.id(), e);
    }

    let status = handle.status();
    info!(
        "Ingestion run {} finished as {:?}: {} processed, {} failed, {} chunks",
        handle.id(),
        status.status,
        status.documents_processed,
        status.documents_failed,
        status.total_chunks
    );
}

/// Sole writer of run state.
async fn aggregate(shared: Arc<RunShared>, mut rx: mpsc::Receiver<RunEvent>) {
    while let Some(event) = rx.recv().await {
        shared.apply(event);
    }
    // No-op unless the dispatcher vanished before finishing the run.
    shared.apply(RunEvent::Failed("ingestion stopped unexpectedly".to_string()));
}

async fn dispatch(
    handle: &RunHandle,
    root: PathBuf,
    config: &IngestionConfig,
    loader: Arc<dyn DocumentLoader>,
    tx: mpsc::Sender<RunEvent>,
) {
    let _ = tx.send(RunEvent::Started).await;

    let walk_root = root.clone();
    let extensions = config.extensions.clone();
    let follow_links = config.follow_links;
    let walk = tokio::task::spawn_blocking(move || discover(&walk_root, &extensions, follow_links));
    let discovery = match walk.await {
        Ok(discovery) => discovery,
        Err(e) => {
            let _ = tx
                .send(RunEvent::Failed(format!("discovery failed: {}", e)))
                .await;
            return;
        }
    };
    info!(
        "Run {} discovered {} documents ({} warnings)",
        handle.id(),
        discovery.files.len(),
        discovery.warnings.len()
    );
    let _ = tx
        .send(RunEvent::Discovered {
            documents: discovery.files.len(),
            warnings: discovery.warnings,
        })
        .await;

    let root = Arc::new(root);
    let chunk_config = config.chunk_config();
    let semaphore = Arc::new(Semaphore::new(config.worker_limit));
    let mut workers = Vec::with_capacity(discovery.files.len());
    let mut cancelled = false;

    for file in discovery.files {
        if handle.is_cancelled() {
            cancelled = true;
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        if handle.is_cancelled() {
            cancelled = true;
            break;
        }

        let tx = tx.clone();
        let loader = loader.clone();
        let root = root.clone();
        workers.push(tokio::spawn(async move {
            let outcome = process_document(loader.as_ref(), &root, &file, chunk_config).await;
            let _ = tx.send(RunEvent::Document(outcome)).await;
            drop(permit);
        }));
    }

    if cancelled {
        info!("Run {} cancelled, waiting for {} started documents", handle.id(), workers.len());
    }
    for result in join_all(workers).await {
        if let Err(e) = result {
            error!("Worker task in run {} failed: {}", handle.id(), e);
        }
    }

    let _ = tx.send(RunEvent::Finished { cancelled }).await;
}

/// Read, parse and chunk one file.
async fn process_document(
    loader: &dyn DocumentLoader,
    root: &Path,
    file: &Path,
    config: ChunkConfig,
) -> DocumentOutcome {
    let path = relative_path(root, file);

    let result = match loader.load(file).await {
        Ok(bytes) => {
            let doc_path = path.clone();
            tokio::task::spawn_blocking(move || parse_and_chunk(&doc_path, bytes, &config))
                .await
                .unwrap_or_else(|e| {
                    Err(DocumentError::Worker {
                        path: path.clone(),
                        reason: e.to_string(),
                    })
                })
        }
        Err(e) => Err(ParseError::new(path.clone(), e).into()),
    };

    match result {
        Ok(chunks) => {
            debug!("Chunked {} into {} chunks", path, chunks.len());
            DocumentOutcome::Chunked { path, chunks }
        }
        Err(e) => {
            warn!("Skipping {}: {}", path, e);
            DocumentOutcome::Failed {
                path,
                error: e.to_string(),
            }
        }
    }
}

fn parse_and_chunk(
    path: &str,
    bytes: Vec<u8>,
    config: &ChunkConfig,
) -> Result<Vec<crate::chunker::Chunk>, DocumentError> {
    let document = parse_markdown_bytes(path, bytes)?;
    chunk_document(&document, config).map_err(|source| DocumentError::Chunk {
        path: path.to_string(),
        source,
    })
}
