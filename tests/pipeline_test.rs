use async_trait::async_trait;
use docs_ingest::{
    reassemble, DiscoveryError, DocumentLoader, FsLoader, IngestError, IngestionConfig, Pipeline, RunState,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const GUIDE: &str = r#"---
title: Guide
sidebar_label: Basics
---

import Admonition from '@theme/Admonition';

# Getting Started

Install the tool first. Then configure it with a small file in your home directory.

<!-- TODO for writers: add screenshots -->

## Running

Run the command from any directory. It prints a summary when it is done. Errors are listed at the end.
"#;

fn write_doc(root: &Path, path: &str, content: impl AsRef<[u8]>) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn config(target_size: usize, overlap: usize) -> IngestionConfig {
    IngestionConfig::new(target_size, overlap, 4)
}

/// Loader that sleeps before every read, to keep runs in flight.
struct SlowLoader(Duration);

#[async_trait]
impl DocumentLoader for SlowLoader {
    async fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::time::sleep(self.0).await;
        FsLoader.load(path).await
    }
}

#[tokio::test]
async fn test_invalid_encoding_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "intro.md", "# Intro\n\nWelcome to the docs.");
    write_doc(dir.path(), "guide/setup.md", GUIDE);
    write_doc(dir.path(), "guide/usage.mdx", "Usage notes.");
    write_doc(dir.path(), "broken.md", [0x23u8, 0x20, 0xff, 0xfe, 0x0a]);
    write_doc(dir.path(), "notes.txt", "ignored");

    let pipeline = Pipeline::new();
    let handle = pipeline.start_ingestion(dir.path(), config(200, 20)).await.unwrap();
    let status = handle.wait().await;

    assert_eq!(status.status, RunState::Completed);
    assert_eq!(status.documents_discovered, 4);
    assert_eq!(status.documents_processed, 3);
    assert_eq!(status.documents_failed, 1);

    let errors = handle.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains_key("broken.md"));
    assert!(errors["broken.md"].contains("UTF-8"));
}

#[tokio::test]
async fn test_chunks_sorted_and_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "z.md", "Last file.");
    write_doc(dir.path(), "guide/setup.md", GUIDE);
    write_doc(dir.path(), "a.md", "First file.");

    let pipeline = Pipeline::new();
    let handle = pipeline.start_ingestion(dir.path(), config(60, 15)).await.unwrap();
    handle.wait().await;

    let page = handle.chunks(usize::MAX, 0);
    let keys: Vec<(&str, usize)> = page
        .chunks
        .iter()
        .map(|c| (c.document_path.as_str(), c.sequence_index))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.first(), Some(&("a.md", 0)));
    assert_eq!(keys.last(), Some(&("z.md", 0)));

    let guide: Vec<_> = page
        .chunks
        .iter()
        .filter(|c| c.document_path == "guide/setup.md")
        .cloned()
        .collect();
    assert!(guide.len() > 1);
    let body = reassemble(&guide);
    assert!(body.starts_with("Getting Started\n\nInstall the tool first."));
    assert!(!body.contains("import Admonition"));
    assert!(!body.contains("screenshots"));
    assert!(body.ends_with("Errors are listed at the end."));
    assert!(guide.iter().all(|c| c.chunk_id.starts_with("guide/setup.md#chunk-")));
}

#[tokio::test]
async fn test_pagination_past_end_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_doc(dir.path(), &format!("doc{}.md", i), "Short page.");
    }

    let pipeline = Pipeline::new();
    let handle = pipeline.start_ingestion(dir.path(), config(100, 10)).await.unwrap();
    pipeline.wait(handle.id()).await.unwrap();

    let page = pipeline.get_chunks(handle.id(), 10, 1000).unwrap();
    assert!(page.chunks.is_empty());
    assert_eq!(page.total_count, 5);

    let page = pipeline.get_chunks(handle.id(), 2, 3).unwrap();
    assert_eq!(page.total_count, 5);
    let paths: Vec<&str> = page.chunks.iter().map(|c| c.document_path.as_str()).collect();
    assert_eq!(paths, vec!["doc3.md", "doc4.md"]);

    let status = pipeline.get_status(handle.id()).unwrap();
    assert_eq!(status.total_chunks, 5);
}

#[tokio::test]
async fn test_rerun_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "guide/setup.md", GUIDE);
    write_doc(
        dir.path(),
        "faq.md",
        "# FAQ\n\nWhy? Because. How? Carefully. When? Soon enough, once it is ready.",
    );

    let pipeline = Pipeline::new();
    let first = pipeline.start_ingestion(dir.path(), config(40, 10)).await.unwrap();
    let second = pipeline.start_ingestion(dir.path(), config(40, 10)).await.unwrap();
    first.wait().await;
    second.wait().await;

    assert_ne!(first.id(), second.id());
    assert_eq!(first.chunks(usize::MAX, 0), second.chunks(usize::MAX, 0));
    assert_eq!(first.errors(), second.errors());
    assert_eq!(pipeline.runs().len(), 2);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    for i in 0..12 {
        write_doc(left.path(), &format!("left{:02}.md", i), "Left side document.");
    }
    for i in 0..7 {
        write_doc(right.path(), &format!("right{:02}.md", i), "Right side document.");
    }
    write_doc(right.path(), "bad.md", [0xc3u8, 0x28]);

    let pipeline = Pipeline::new();
    let (a, b) = tokio::join!(
        pipeline.start_ingestion(left.path(), config(100, 10)),
        pipeline.start_ingestion(right.path(), config(100, 10)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    let (status_a, status_b) = tokio::join!(a.wait(), b.wait());

    assert_eq!(status_a.documents_processed, 12);
    assert_eq!(status_a.documents_failed, 0);
    assert_eq!(status_a.total_chunks, 12);
    assert_eq!(status_b.documents_processed, 7);
    assert_eq!(status_b.documents_failed, 1);
    assert_eq!(status_b.total_chunks, 7);

    assert!(a.chunks(usize::MAX, 0).chunks.iter().all(|c| c.document_path.starts_with("left")));
    assert!(b.chunks(usize::MAX, 0).chunks.iter().all(|c| c.document_path.starts_with("right")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_walk_error_is_warning_not_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "intro.md", "Intro page.");
    write_doc(dir.path(), "guide/setup.md", "Setup page.");
    std::os::unix::fs::symlink(dir.path(), dir.path().join("guide/back")).unwrap();

    let pipeline = Pipeline::new();
    let mut looping = config(100, 10);
    looping.follow_links = true;
    let handle = pipeline.start_ingestion(dir.path(), looping).await.unwrap();
    let status = handle.wait().await;

    assert_eq!(status.status, RunState::Completed);
    assert_eq!(status.documents_discovered, 2);
    assert_eq!(status.documents_processed, 2);
    assert_eq!(status.documents_failed, 0);
    let warnings = handle.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("guide/back"));
    assert!(handle.errors().is_empty());
}

#[tokio::test]
async fn test_missing_root_fails_before_handle() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new();

    let err = pipeline
        .start_ingestion(dir.path().join("nope"), config(100, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Discovery(DiscoveryError::NotFound(_))));
    assert!(pipeline.runs().is_empty());
}

#[tokio::test]
async fn test_invalid_config_fails_before_handle() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new();

    let err = pipeline
        .start_ingestion(dir.path(), config(50, 50))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Config(_)));
}

#[tokio::test]
async fn test_status_readable_mid_run() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4 {
        write_doc(dir.path(), &format!("doc{}.md", i), "Slow document.");
    }

    let pipeline = Pipeline::with_loader(Arc::new(SlowLoader(Duration::from_millis(100))));
    let mut slow = config(100, 10);
    slow.worker_limit = 1;
    let handle = pipeline.start_ingestion(dir.path(), slow).await.unwrap();

    let status = handle.status();
    assert!(!status.status.is_terminal());
    assert!(status.documents_processed < 4);

    let status = handle.wait().await;
    assert_eq!(status.status, RunState::Completed);
    assert_eq!(status.documents_processed, 4);
}

#[tokio::test]
async fn test_cancel_keeps_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        write_doc(dir.path(), &format!("doc{:02}.md", i), "Cancellable document.");
    }

    let pipeline = Pipeline::with_loader(Arc::new(SlowLoader(Duration::from_millis(50))));
    let mut slow = config(100, 10);
    slow.worker_limit = 1;
    let handle = pipeline.start_ingestion(dir.path(), slow).await.unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    pipeline.cancel(handle.id()).unwrap();
    let status = handle.wait().await;

    assert_eq!(status.status, RunState::Cancelled);
    assert!(status.documents_processed < 20);
    assert_eq!(status.total_chunks, status.documents_processed);
}
