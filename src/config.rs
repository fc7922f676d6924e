use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::{DEFAULT_OVERLAP, DEFAULT_TARGET_SIZE};
use crate::pipeline::{default_extensions, default_worker_limit, IngestionConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub worker_limit: usize,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub docs_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from environment variables and validate the
    /// ingestion settings.
    pub fn from_env() -> Result<Self> {
        let config = Self::read_env();
        config
            .ingestion_config()
            .validate()
            .context("invalid ingestion settings in environment")?;

        Ok(config)
    }

    /// Load configuration from environment variables without validating it,
    /// for callers that apply overrides first.
    pub fn read_env() -> Self {
        let docs_path = env::var("DOCS_PATH")
            .or_else(|_| env::var("DOCUSAURUS_DOCS_PATH"))
            .unwrap_or_else(|_| "../docs".to_string())
            .into();

        let chunking = ChunkingConfig {
            chunk_size: parse_var("CHUNK_SIZE", DEFAULT_TARGET_SIZE),
            chunk_overlap: parse_var("CHUNK_OVERLAP", DEFAULT_OVERLAP),
        };

        let processing = ProcessingConfig {
            worker_limit: parse_var("WORKER_LIMIT", default_worker_limit()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let output = OutputConfig {
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()),
        };

        Self {
            docs_path,
            chunking,
            processing,
            output,
        }
    }

    pub fn ingestion_config(&self) -> IngestionConfig {
        IngestionConfig {
            target_size: self.chunking.chunk_size,
            overlap: self.chunking.chunk_overlap,
            worker_limit: self.processing.worker_limit,
            extensions: default_extensions(),
            follow_links: false,
        }
    }
}

/// Unset or unparsable values fall back to `default`.
fn parse_var(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
