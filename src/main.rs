use anyhow::{bail, Result};
use clap::Parser;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

use docs_ingest::{ChunkReport, Config, Pipeline, RunState};

const PAGE_SIZE: usize = 500;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Documentation root to ingest (defaults to DOCS_PATH)
    #[arg(short = 'r', long)]
    root: Option<PathBuf>,

    /// Output directory for chunks.jsonl (defaults to OUTPUT_DIR)
    #[arg(short = 'd', long)]
    output_dir: Option<String>,

    /// Target chunk size in characters (defaults to CHUNK_SIZE)
    #[arg(short = 's', long)]
    chunk_size: Option<usize>,

    /// Overlap between consecutive chunks in characters (defaults to CHUNK_OVERLAP)
    #[arg(short = 'o', long)]
    overlap: Option<usize>,

    /// Maximum documents processed at once (defaults to WORKER_LIMIT)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Follow symbolic links inside the documentation root
    #[arg(long)]
    follow_links: bool,
}

fn init_tracing(log_level: &str) {
    let level = log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    // Validated after CLI overrides, by start_ingestion.
    let config = Config::read_env();
    init_tracing(&config.processing.log_level);

    let mut ingestion = config.ingestion_config();
    if let Some(size) = args.chunk_size {
        ingestion.target_size = size;
    }
    if let Some(overlap) = args.overlap {
        ingestion.overlap = overlap;
    }
    if let Some(workers) = args.workers {
        ingestion.worker_limit = workers;
    }
    ingestion.follow_links = args.follow_links;
    let root = args.root.unwrap_or(config.docs_path);
    let output_dir = PathBuf::from(args.output_dir.unwrap_or(config.output.output_dir));
    fs::create_dir_all(&output_dir)?;

    let pipeline = Pipeline::new();
    let handle = pipeline.start_ingestion(&root, ingestion.clone()).await?;

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut cancel_requested = false;
    let status = loop {
        tokio::select! {
            status = &mut wait => break status,
            _ = ticker.tick() => {
                let status = handle.status();
                info!(
                    "{:?}: {}/{} documents, {} failed, {} chunks",
                    status.status,
                    status.documents_processed + status.documents_failed,
                    status.documents_discovered,
                    status.documents_failed,
                    status.total_chunks
                );
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                println!("Cancelling ingestion, waiting for started documents...");
                handle.cancel();
                cancel_requested = true;
            }
        }
    };

    if status.status == RunState::Failed {
        bail!(
            "Ingestion failed: {}",
            status.fatal_error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let output_file = output_dir.join("chunks.jsonl");
    let mut file = fs::File::create(&output_file)?;
    let mut chunks = Vec::with_capacity(status.total_chunks);
    let mut offset = 0;
    loop {
        let page = handle.chunks(PAGE_SIZE, offset);
        if page.chunks.is_empty() {
            break;
        }
        offset += page.chunks.len();
        for chunk in &page.chunks {
            writeln!(file, "{}", serde_json::to_string(chunk)?)?;
        }
        chunks.extend(page.chunks);
    }

    for (path, error) in handle.errors() {
        eprintln!("Failed: {}: {}", path, error);
    }
    for warning in handle.warnings() {
        eprintln!("Warning: {}", warning);
    }

    let report = ChunkReport::from_chunks(&chunks, &ingestion.chunk_config());
    println!("\nIngestion {:?}", status.status);
    println!("--------------------------------");
    println!("Documents processed: {}", status.documents_processed);
    println!("Documents failed:    {}", status.documents_failed);
    println!("Chunks created:      {}", report.total_chunks);
    println!("Average chunk size:  {:.1} chars", report.average_chunk_size);
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    println!("Results saved to: {:?}", output_file);

    Ok(())
}
