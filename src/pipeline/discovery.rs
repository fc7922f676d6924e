use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use super::error::DiscoveryError;
use crate::parser::relative_path;

const SKIPPED_DIRS: &[&str] = &["node_modules"];

/// Files found under a root, plus non-fatal walk problems.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Sorted by path relative to the root
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Check that `root` is a readable directory before any work starts.
pub fn preflight(root: &Path) -> Result<(), DiscoveryError> {
    let metadata = std::fs::metadata(root).map_err(|source| match source.kind() {
        ErrorKind::NotFound => DiscoveryError::NotFound(root.to_path_buf()),
        _ => DiscoveryError::Unreadable {
            path: root.to_path_buf(),
            source,
        },
    })?;
    if !metadata.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| DiscoveryError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Recursively collect files whose extension is in `extensions`.
pub fn discover(root: &Path, extensions: &[String], follow_links: bool) -> Discovery {
    let mut discovery = Discovery::default();

    let walker = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                    discovery.files.push(entry.into_path());
                }
            }
            Err(err) => {
                let location = err
                    .path()
                    .map(|p| relative_path(root, p))
                    .unwrap_or_else(|| root.display().to_string());
                warn!("Skipping {}: {}", location, err);
                discovery.warnings.push(format!("{}: {}", location, err));
            }
        }
    }

    discovery
        .files
        .sort_by_cached_key(|path| relative_path(root, path));
    discovery
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
