use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

use super::IngestionConfig;
use crate::chunker::Chunk;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub status: RunState,
    pub documents_discovered: usize,
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub total_chunks: usize,
    pub fatal_error: Option<String>,
}

/// One page of a run's sorted chunk sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPage {
    pub chunks: Vec<Chunk>,
    pub total_count: usize,
}

/// One ingestion over a documentation tree.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    pub id: RunId,
    pub root: PathBuf,
    pub config: IngestionConfig,
    pub status: RunState,
    pub documents_discovered: usize,
    pub documents_processed: usize,
    pub documents_failed: usize,
    /// Sorted by document path, then sequence index
    pub chunks: Vec<Chunk>,
    /// Document path to error description
    pub errors: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub fatal_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of processing one document.
#[derive(Debug)]
pub(crate) enum DocumentOutcome {
    Chunked { path: String, chunks: Vec<Chunk> },
    Failed { path: String, error: String },
}

/// Messages from the dispatcher and workers to the aggregator.
#[derive(Debug)]
pub(crate) enum RunEvent {
    Started,
    Discovered { documents: usize, warnings: Vec<String> },
    Document(DocumentOutcome),
    Failed(String),
    Finished { cancelled: bool },
}

impl IngestionRun {
    pub(crate) fn new(id: RunId, root: PathBuf, config: IngestionConfig) -> Self {
        Self {
            id,
            root,
            config,
            status: RunState::Pending,
            documents_discovered: 0,
            documents_processed: 0,
            documents_failed: 0,
            chunks: Vec::new(),
            errors: BTreeMap::new(),
            warnings: Vec::new(),
            fatal_error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn snapshot(&self) -> RunStatus {
        RunStatus {
            run_id: self.id,
            status: self.status,
            documents_discovered: self.documents_discovered,
            documents_processed: self.documents_processed,
            documents_failed: self.documents_failed,
            total_chunks: self.chunks.len(),
            fatal_error: self.fatal_error.clone(),
        }
    }

    /// Out-of-range offsets yield an empty page.
    pub fn page(&self, limit: usize, offset: usize) -> ChunkPage {
        let chunks = self
            .chunks
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        ChunkPage {
            chunks,
            total_count: self.chunks.len(),
        }
    }

    /// Fold one event into the run. Terminal runs ignore further events.
    pub(crate) fn apply(&mut self, event: RunEvent) {
        if self.status.is_terminal() {
            return;
        }
        match event {
            RunEvent::Started => self.status = RunState::Running,
            RunEvent::Discovered {
                documents,
                warnings,
            } => {
                self.documents_discovered = documents;
                self.warnings.extend(warnings);
            }
            RunEvent::Document(DocumentOutcome::Chunked { path, chunks }) => {
                self.documents_processed += 1;
                let at = self
                    .chunks
                    .partition_point(|c| c.document_path.as_str() < path.as_str());
                self.chunks.splice(at..at, chunks);
            }
            RunEvent::Document(DocumentOutcome::Failed { path, error }) => {
                self.documents_failed += 1;
                self.errors.insert(path, error);
            }
            RunEvent::Failed(reason) => {
                self.status = RunState::Failed;
                self.fatal_error = Some(reason);
                self.finished_at = Some(Utc::now());
            }
            RunEvent::Finished { cancelled } => {
                self.status = if cancelled {
                    RunState::Cancelled
                } else {
                    RunState::Completed
                };
                self.finished_at = Some(Utc::now());
            }
        }
    }
}

pub(crate) struct RunShared {
    run: RwLock<IngestionRun>,
    cancelled: AtomicBool,
    state: watch::Sender<RunState>,
}

impl RunShared {
    pub(crate) fn apply(&self, event: RunEvent) {
        let state = {
            let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
            run.apply(event);
            run.status
        };
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn read<T>(&self, f: impl FnOnce(&IngestionRun) -> T) -> T {
        let run = self.run.read().unwrap_or_else(PoisonError::into_inner);
        f(&run)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cloneable reference to one run.
#[derive(Clone)]
pub struct RunHandle {
    id: RunId,
    pub(crate) shared: Arc<RunShared>,
}

impl RunHandle {
    pub(crate) fn new(run: IngestionRun) -> Self {
        let (state, _) = watch::channel(run.status);
        Self {
            id: run.id,
            shared: Arc::new(RunShared {
                run: RwLock::new(run),
                cancelled: AtomicBool::new(false),
                state,
            }),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.shared.read(IngestionRun::snapshot)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.read(|run| run.started_at)
    }

    /// Start time and status, read under one lock without copying chunks.
    pub fn summary(&self) -> (DateTime<Utc>, RunStatus) {
        self.shared.read(|run| (run.started_at, run.snapshot()))
    }

    pub fn chunks(&self, limit: usize, offset: usize) -> ChunkPage {
        self.shared.read(|run| run.page(limit, offset))
    }

    pub fn errors(&self) -> BTreeMap<String, String> {
        self.shared.read(|run| run.errors.clone())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.shared.read(|run| run.warnings.clone())
    }

    /// Full copy of the run as it stands now.
    pub fn run(&self) -> IngestionRun {
        self.shared.read(IngestionRun::clone)
    }

    /// Stop dispatching new documents. Documents already started finish.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Resolve once the run reaches a terminal state.
    pub async fn wait(&self) -> RunStatus {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = state.wait_for(|s| s.is_terminal()).await;
        self.status()
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle").field("id", &self.id).finish()
    }
}
