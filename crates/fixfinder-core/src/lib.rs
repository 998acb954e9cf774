//! Fixfinder Core - Domain types for the service-documentation retrieval engine.

mod error;
mod types;

pub use error::{Error, Result};
pub use types::*;
