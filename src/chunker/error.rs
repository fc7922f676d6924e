use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk configuration: target size must be greater than zero")]
    ZeroTargetSize,

    #[error("invalid chunk configuration: overlap ({overlap}) must be smaller than target size ({target_size})")]
    OverlapTooLarge { overlap: usize, target_size: usize },
}
