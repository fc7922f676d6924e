pub mod chunker;
pub mod config;
pub mod parser;
pub mod pipeline;

pub use chunker::{chunk_document, chunk_text, reassemble, Chunk, ChunkConfig, ChunkError, ChunkReport};
pub use config::Config;
pub use parser::{parse_markdown, parse_markdown_bytes, parse_markdown_file, Document, ParseError};
pub use pipeline::{
    ChunkPage, DiscoveryError, DocumentLoader, FsLoader, IngestError, IngestionConfig, IngestionRun, Pipeline,
    RunHandle, RunId, RunState, RunStatus,
};
