//! Boundary-aware text chunker.
//!
//! Splits a document body into overlapping [`Chunk`]s of roughly
//! `target_size` characters. Cut points are chosen from heading, paragraph,
//! sentence and word boundaries in that order of preference, falling back to
//! a hard cut. Offsets and sizes are measured in characters.

pub mod boundary;
pub mod error;
mod report;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::Document;
use boundary::{Boundaries, CharIndex};

pub use error::ChunkError;
pub use report::ChunkReport;

pub const DEFAULT_TARGET_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub target_size: usize,
    pub overlap: usize,
    /// How far past `target_size` a chunk may run to reach a soft boundary
    pub slack: usize,
}

impl ChunkConfig {
    /// Slack defaults to the overlap.
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size,
            overlap,
            slack: overlap,
        }
    }

    pub fn with_slack(mut self, slack: usize) -> Self {
        self.slack = slack;
        self
    }

    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.target_size == 0 {
            return Err(ChunkError::ZeroTargetSize);
        }
        if self.overlap >= self.target_size {
            return Err(ChunkError::OverlapTooLarge {
                overlap: self.overlap,
                target_size: self.target_size,
            });
        }
        Ok(())
    }

    /// Upper bound on a chunk's length.
    pub fn max_chunk_len(&self) -> usize {
        self.target_size + self.slack
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SIZE, DEFAULT_OVERLAP)
    }
}

/// A positioned slice of a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_path: String,
    pub content: String,
    /// Char offset of the first char in the body
    pub start_offset: usize,
    /// Char offset one past the last char
    pub end_offset: usize,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn id_for(document_path: &str, sequence_index: usize) -> String {
        format!("{}#chunk-{}", document_path, sequence_index)
    }

    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Chunk a parsed document. Only the heading positions the parser recorded
/// count as heading boundaries.
pub fn chunk_document(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkError> {
    chunk_with_headings(&document.path, &document.body, Some(document.heading_offsets.as_slice()), config)
}

/// Chunk raw text. Headings are recognised by their `#` markers.
pub fn chunk_text(document_path: &str, body: &str, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkError> {
    chunk_with_headings(document_path, body, None, config)
}

fn chunk_with_headings(
    document_path: &str,
    body: &str,
    heading_offsets: Option<&[usize]>,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>, ChunkError> {
    config.validate()?;

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let index = CharIndex::new(body);
    let spans = split_spans(body, &index, heading_offsets, config);
    debug!(path = document_path, chunks = spans.len(), "chunked document");

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(sequence_index, (start, end))| Chunk {
            chunk_id: Chunk::id_for(document_path, sequence_index),
            document_path: document_path.to_string(),
            content: body[index.to_byte(start)..index.to_byte(end)].to_string(),
            start_offset: start,
            end_offset: end,
            sequence_index,
        })
        .collect())
}

/// Compute `(start, end)` char spans covering the whole text.
fn split_spans(
    body: &str,
    index: &CharIndex,
    heading_offsets: Option<&[usize]>,
    config: &ChunkConfig,
) -> Vec<(usize, usize)> {
    let len = index.len();
    let target = config.target_size;
    let overlap = config.overlap;

    if len <= target {
        return vec![(0, len)];
    }

    let boundaries = Boundaries::detect(body, index, heading_offsets);
    // Each cut must leave room for the overlap and still move forward.
    let min_len = (target / 2).max(overlap + 1).min(target);

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        if len - start <= target {
            spans.push((start, len));
            break;
        }

        let ideal = start + target;
        let hi = (ideal + config.slack).min(len);
        let end = match boundaries.best_cut(start + min_len, hi, ideal) {
            Some((cut, kind)) => {
                debug!(start, cut, ?kind, "soft cut");
                cut
            }
            None => ideal,
        };
        spans.push((start, end));

        let overlapped = end - overlap;
        start = if overlap == 0 {
            end
        } else {
            boundaries.first_in(overlapped, end).unwrap_or(overlapped)
        };
    }

    spans
}

/// Rebuild the body from chunks in sequence order, dropping each chunk's
/// overlap with its predecessor.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start_offset);
        text.extend(chunk.content.chars().skip(skip));
        covered = covered.max(chunk.end_offset);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_markdown;

    const SAMPLE: &str = "# Intro\n\nHello world. This is a test document with several sentences. It continues here.";

    fn assert_well_formed(body: &str, chunks: &[Chunk], config: &ChunkConfig) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks.last().unwrap().end_offset, body.chars().count());

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
            assert!(chunk.len() > 0, "chunk {} is empty", i);
            assert!(chunk.len() <= config.max_chunk_len(), "chunk {} too long: {}", i, chunk.len());
            assert_eq!(chunk.content.chars().count(), chunk.len());
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].start_offset <= pair[0].end_offset);
            if config.overlap > 0 {
                assert!(pair[0].end_offset > pair[1].start_offset);
            }
        }
        assert_eq!(reassemble(chunks), body);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert_eq!(
            chunk_text("a.md", SAMPLE, &ChunkConfig::new(0, 0)),
            Err(ChunkError::ZeroTargetSize)
        );
        assert_eq!(
            chunk_text("a.md", SAMPLE, &ChunkConfig::new(40, 40)),
            Err(ChunkError::OverlapTooLarge { overlap: 40, target_size: 40 })
        );
        assert!(chunk_text("a.md", "", &ChunkConfig::new(10, 50)).is_err());
    }

    #[test]
    fn test_empty_body_has_no_chunks() {
        let config = ChunkConfig::new(40, 10);
        assert!(chunk_text("a.md", "", &config).unwrap().is_empty());
        assert!(chunk_text("a.md", "  \n\n\t ", &config).unwrap().is_empty());
    }

    #[test]
    fn test_short_body_single_chunk() {
        let chunks = chunk_text("guide/a.md", "Short text.", &ChunkConfig::new(40, 10)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].content, "Short text.");
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 11);
        assert_eq!(chunks[0].chunk_id, "guide/a.md#chunk-0");
    }

    #[test]
    fn test_sample_splits_at_sentences_with_overlap() {
        let config = ChunkConfig::new(40, 10);
        let chunks = chunk_text("a.md", SAMPLE, &config).unwrap();

        assert_well_formed(SAMPLE, &chunks, &config);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].content, "# Intro\n\nHello world. ");
        // Starts 10 chars before the previous end, snapped to the next word.
        assert_eq!(chunks[1].start_offset, 15);
        assert!(chunks[1].content.starts_with("world. This is"));
        assert!(chunks[2].content.ends_with("sentences. "));
        assert!(chunks[3].content.ends_with("It continues here."));
    }

    #[test]
    fn test_heading_preferred_over_sentence() {
        let body = "Alpha beta gamma. Delta epsilon zeta.\n# Next\nEta theta iota kappa lambda mu nu xi.";
        let config = ChunkConfig::new(40, 5);
        let chunks = chunk_text("a.md", body, &config).unwrap();

        assert_well_formed(body, &chunks, &config);
        assert_eq!(chunks[0].end_offset, 38);
        assert!(chunks[0].content.ends_with("zeta.\n"));
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let body = "x".repeat(100);
        let config = ChunkConfig::new(30, 5);
        let chunks = chunk_text("a.md", &body, &config).unwrap();

        assert_well_formed(&body, &chunks, &config);
        assert_eq!(chunks[0].len(), 30);
        assert_eq!(chunks[1].start_offset, 25);
    }

    #[test]
    fn test_zero_overlap_is_contiguous() {
        let body = "one two three four five six seven eight nine ten eleven twelve";
        let config = ChunkConfig::new(20, 0);
        let chunks = chunk_text("a.md", body, &config).unwrap();

        assert_well_formed(body, &chunks, &config);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_offset, pair[1].start_offset);
        }
    }

    #[test]
    fn test_round_trip_across_configs() {
        let body = (0..40)
            .map(|i| {
                if i % 7 == 0 {
                    format!("## Section {}\n\nParagraph {} starts here. It has two sentences!", i, i)
                } else {
                    format!("Line {} with ünïcödé words and more text to fill space.", i)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        for (target, overlap) in [(50, 0), (50, 10), (120, 30), (300, 299), (1, 0)] {
            let config = ChunkConfig::new(target, overlap);
            let chunks = chunk_text("a.md", &body, &config).unwrap();
            assert_well_formed(&body, &chunks, &config);
        }
    }

    #[test]
    fn test_deterministic() {
        let config = ChunkConfig::new(25, 8);
        let first = chunk_text("a.md", SAMPLE, &config).unwrap();
        let second = chunk_text("a.md", SAMPLE, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let body = "Größe über alles. Ärger ist schön. Öl und Wasser.";
        let config = ChunkConfig::new(20, 4);
        let chunks = chunk_text("a.md", body, &config).unwrap();

        assert_well_formed(body, &chunks, &config);
        assert_eq!(chunks[0].content, "Größe über alles. ");
    }

    #[test]
    fn test_reassemble_drops_overlap() {
        let chunks = vec![
            Chunk {
                chunk_id: Chunk::id_for("a.md", 0),
                document_path: "a.md".to_string(),
                content: "one two ".to_string(),
                start_offset: 0,
                end_offset: 8,
                sequence_index: 0,
            },
            Chunk {
                chunk_id: Chunk::id_for("a.md", 1),
                document_path: "a.md".to_string(),
                content: "two three".to_string(),
                start_offset: 4,
                end_offset: 13,
                sequence_index: 1,
            },
        ];
        assert_eq!(reassemble(&chunks), "one two three");
        assert_eq!(reassemble(&[]), "");
    }

    #[test]
    fn test_code_comment_is_not_a_heading() {
        let markdown = "Intro paragraph goes here with words.\n\n```bash\n# install deps\nnpm install\n```\n\nMore text follows after the code block here.";
        let doc = parse_markdown("install.md", markdown);
        assert!(doc.heading_offsets.is_empty());
        assert!(doc.body.contains("\n# install deps\n"));

        let config = ChunkConfig::new(60, 5);
        let chunks = chunk_document(&doc, &config).unwrap();
        assert_well_formed(&doc.body, &chunks, &config);
        assert_eq!(chunks[0].end_offset, 39);
        assert_eq!(chunks[0].content, "Intro paragraph goes here with words.\n\n");

        // Raw text still treats `#` lines as headings.
        let chunks = chunk_text("install.md", &doc.body, &config).unwrap();
        assert_eq!(chunks[0].end_offset, 47);
    }

    #[test]
    fn test_chunk_document_uses_parsed_headings() {
        let markdown = "Some opening words here.\n\n## Setup\n\nInstall the tool and run it.";
        let doc = parse_markdown("setup.md", markdown);
        assert_eq!(doc.body, "Some opening words here.\n\nSetup\n\nInstall the tool and run it.");

        let config = ChunkConfig::new(40, 5);
        let chunks = chunk_document(&doc, &config).unwrap();

        assert_well_formed(&doc.body, &chunks, &config);
        assert_eq!(chunks[0].end_offset, 26);
        assert!(chunks[1].content.contains("Setup"));
        assert!(chunks.iter().all(|c| c.document_path == "setup.md"));
    }
}
