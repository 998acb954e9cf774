//! Search error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Database error: {0}")]
    Database(#[from] fixfinder_db::DbError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Every search index failed: {0}")]
    AllIndexesUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

pub type SearchResult<T> = Result<T, SearchError>;
