use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] chunking::ChunkingError),

    #[error("Invocation error: {0}")]
    Invocation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod config;
pub mod context;
pub mod index;
pub mod ingest;
pub mod invoke;
pub mod models;
pub mod query;
pub mod storage;
pub mod ui;
