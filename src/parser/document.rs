use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled Document";

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Path relative to the documentation root, `/`-separated
    pub path: String,
    /// Original text before normalization
    pub raw_content: String,
    /// Front-matter key/value pairs
    pub metadata: BTreeMap<String, String>,
    /// Normalized prose the chunker operates on
    pub body: String,
    /// Front-matter title, first heading, or [`UNTITLED`]
    pub title: String,
    /// Character offsets in `body` where heading lines start
    pub heading_offsets: Vec<usize>,
}

impl Document {
    /// `sidebar_label` takes precedence over `category`.
    pub fn category(&self) -> Option<&str> {
        self.metadata
            .get("sidebar_label")
            .or_else(|| self.metadata.get("category"))
            .map(String::as_str)
    }

    /// Tags from either a `[a, b]` list or a comma-separated string.
    pub fn tags(&self) -> Vec<String> {
        let Some(raw) = self.metadata.get("tags") else {
            return Vec::new();
        };
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .unwrap_or(raw);

        raw.split(',')
            .map(|tag| tag.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    pub fn author(&self) -> Option<&str> {
        self.metadata.get("author").map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}
