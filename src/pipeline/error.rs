use std::path::PathBuf;

use thiserror::Error;

use super::RunId;
use crate::chunker::ChunkError;
use crate::parser::ParseError;

/// The documentation root cannot be walked at all.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("documentation root does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("documentation root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("documentation root is not readable: {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single document. Recorded in the run, never fatal.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to chunk {path}: {source}")]
    Chunk {
        path: String,
        #[source]
        source: ChunkError,
    },

    #[error("worker for {path} stopped: {reason}")]
    Worker { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Config(#[from] ChunkError),

    #[error("worker limit must be at least 1")]
    ZeroWorkerLimit,

    #[error("unknown ingestion run: {0}")]
    UnknownRun(RunId),

    #[error("ingestion run {0} is still in progress")]
    RunInProgress(RunId),
}
