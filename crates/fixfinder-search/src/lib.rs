//! Fixfinder Search - unified retrieval over the lexical index, the semantic
//! index, and the error-code catalog, merged by resource priority.

mod codes;
mod engine;
mod error;
mod ranker;

pub use codes::detect_error_codes;
pub use engine::{QueryEmbedder, SearchEngine, SearchQuery};
pub use error::{SearchError, SearchResult};
pub use ranker::{merge_hits, PriorityPolicy};
