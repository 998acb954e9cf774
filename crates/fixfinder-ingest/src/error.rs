//! Ingestion error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] fixfinder_db::DbError),

    #[error("Invalid intake: {0}")]
    InvalidIntake(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
