//! Store operations, one module per store.

pub mod audit;
pub mod chunks;
pub mod content;
pub mod embeddings;
pub mod error_codes;
pub mod queue;
pub mod resources;
pub mod stats;
