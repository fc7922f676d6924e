use async_trait::async_trait;
use std::path::Path;

/// Source of raw document bytes. The pipeline's only suspension point.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads documents from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

#[async_trait]
impl DocumentLoader for FsLoader {
    async fn load(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}
