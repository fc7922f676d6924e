use serde::Serialize;
use std::collections::BTreeMap;

use super::{Chunk, ChunkConfig};

const BUCKET_WIDTH: usize = 100;

/// Quality summary over a set of chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkReport {
    pub total_chunks: usize,
    pub empty_chunks: usize,
    pub oversized_chunks: usize,
    pub average_chunk_size: f64,
    /// Chunk count per size bucket (lower bound of a 100-char bucket)
    pub size_distribution: BTreeMap<usize, usize>,
    pub warnings: Vec<String>,
}

impl ChunkReport {
    pub fn from_chunks(chunks: &[Chunk], config: &ChunkConfig) -> Self {
        let mut report = ChunkReport {
            total_chunks: chunks.len(),
            ..Default::default()
        };

        if chunks.is_empty() {
            report.warnings.push("No chunks to validate".to_string());
            return report;
        }

        let mut total_chars = 0;
        for chunk in chunks {
            if chunk.content.trim().is_empty() {
                report.empty_chunks += 1;
                continue;
            }

            let size = chunk.content.chars().count();
            total_chars += size;
            if size > config.max_chunk_len() {
                report.oversized_chunks += 1;
            }
            *report
                .size_distribution
                .entry(size / BUCKET_WIDTH * BUCKET_WIDTH)
                .or_insert(0) += 1;
        }

        report.average_chunk_size = total_chars as f64 / chunks.len() as f64;

        if report.empty_chunks > 0 {
            report
                .warnings
                .push(format!("Found {} empty chunks", report.empty_chunks));
        }
        if report.oversized_chunks > 0 {
            report
                .warnings
                .push(format!("Found {} oversized chunks", report.oversized_chunks));
        }

        report
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
