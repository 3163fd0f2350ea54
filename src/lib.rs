use thiserror::Error;

pub type Result<T, E = PaperError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PaperError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("arXiv error: {0}")]
    Arxiv(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod arxiv;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod ingest;
pub mod pdf;
