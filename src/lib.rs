use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}


pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod http;
pub mod namespace;
pub mod notion;
pub mod rag;
pub mod synthesis;
