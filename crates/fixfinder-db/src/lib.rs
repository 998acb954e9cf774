//! Fixfinder DB - SQLite storage layer for Fixfinder.
//!
//! Hosts every store behind the [`Database`] handle: the content-addressable
//! store, chunks with their FTS5 lexical index, embeddings, the error-code
//! catalog, resources, the ingestion task queue, and the audit log.

mod database;
mod error;
mod migrations;
mod operations;

pub use database::Database;
pub use error::{DbError, DbResult};
pub use operations::content::content_hash;
pub use operations::embeddings::{cosine_similarity, SemanticHit};
pub use operations::error_codes::DuplicateErrorCode;
pub use operations::queue::QueueCounts;
pub use operations::stats::DatabaseStats;
