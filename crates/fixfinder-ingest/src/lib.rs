//! Fixfinder Ingest - document intake pipeline and queue workers.
//!
//! Intake stores bytes in the content store, registers a resource, and
//! drives the rest (chunking, embedding, error-code extraction) through the
//! task queue so every step is retryable and cancellable.

mod error;
mod extract;
mod pipeline;
mod worker;

pub use error::{IngestError, IngestResult};
pub use extract::{extract_error_codes, ExtractedCode};
pub use pipeline::{DocumentIntake, IngestPipeline};
pub use worker::{TaskHandler, Worker, WorkerPool};
