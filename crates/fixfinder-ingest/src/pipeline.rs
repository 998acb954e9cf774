//! Document intake pipeline.
//!
//! Intake is synchronous and small: hash the bytes, register the resource,
//! enqueue the first task. Chunking, embedding, and extraction all run as
//! queue tasks so a crash mid-pipeline loses nothing.

use crate::error::{IngestError, IngestResult};
use crate::extract::extract_error_codes;
use fixfinder_config::{Config, QueueConfig};
use fixfinder_core::{
    Chunk, ChunkStatus, ContentRecord, EmbeddingModel, ErrorCodeRecord, ErrorCodeSource,
    IngestionTask, ResourceId, ResourceLink, ResourceType, TaskType,
};
use fixfinder_db::{content_hash, Database};
use tracing::{debug, info};

/// Soft cap on chunk size. Paragraphs pack together up to this; a single
/// oversized paragraph is split hard at the cap.
const CHUNK_TARGET_CHARS: usize = 1000;

/// Result of a document submission.
#[derive(Debug, Clone)]
pub struct DocumentIntake {
    pub resource: ResourceLink,
    pub content: ContentRecord,
    /// True when the bytes were already stored and no new work was queued.
    pub deduplicated: bool,
}

pub struct IngestPipeline {
    db: Database,
    queue: QueueConfig,
    model: EmbeddingModel,
    embeddings_enabled: bool,
}

impl IngestPipeline {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            queue: config.queue.clone(),
            model: config.embedding.model(),
            embeddings_enabled: config.embedding.enabled(),
        }
    }

    /// Submit document bytes for ingestion.
    ///
    /// Identical bytes short-circuit: the existing resource comes back with
    /// `deduplicated` set and nothing is enqueued. Otherwise the resource is
    /// registered and a chunking task queued.
    pub fn submit_document(
        &self,
        bytes: &[u8],
        title: &str,
        resource_type: ResourceType,
        manufacturer_id: Option<&str>,
        series_id: Option<&str>,
        source_url: Option<&str>,
    ) -> IngestResult<DocumentIntake> {
        if !resource_type.is_document() {
            return Err(IngestError::InvalidIntake(format!(
                "{} is not a chunkable document type",
                resource_type
            )));
        }

        let content = self.db.put_content(bytes)?;

        if let Some(existing) = self.db.find_resource_by_content(&content.id)? {
            info!(
                "Document '{}' already ingested as '{}', skipping",
                title, existing.title
            );
            return Ok(DocumentIntake {
                resource: existing,
                content,
                deduplicated: true,
            });
        }

        let mut resource =
            ResourceLink::new(resource_type, title).with_content(content.id.clone());
        if let Some(m) = manufacturer_id {
            resource = resource.with_manufacturer(m);
        }
        if let Some(s) = series_id {
            resource = resource.with_series(s);
        }
        if let Some(url) = source_url {
            resource = resource.with_url(url);
        }
        self.db.create_resource(&resource)?;

        self.enqueue(TaskType::ChunkDocument, &resource.id)?;
        info!("Queued chunking for document '{}'", title);

        Ok(DocumentIntake {
            resource,
            content,
            deduplicated: false,
        })
    }

    /// Submit image bytes. Stored and queued for processing; the resulting
    /// task carries the content id. Bytes seen before are not re-queued.
    pub fn submit_image(&self, bytes: &[u8]) -> IngestResult<(ContentRecord, bool)> {
        let seen = self
            .db
            .get_content_by_hash(&content_hash(bytes))?
            .is_some();

        let content = self.db.put_content(bytes)?;
        if seen {
            return Ok((content, false));
        }

        self.enqueue(TaskType::IngestImage, &content.id)?;
        Ok((content, true))
    }

    /// Split extracted document text into chunks and queue follow-up work.
    ///
    /// Chunks are fingerprinted, so re-running over the same text creates
    /// nothing and queues nothing.
    pub fn chunk_document(&self, document_id: &ResourceId, text: &str) -> IngestResult<Vec<Chunk>> {
        // Validates the document exists before writing chunks
        self.db.get_resource(document_id)?;

        let mut chunks = Vec::new();
        for (index, piece) in split_text(text).into_iter().enumerate() {
            let chunk = Chunk::new(
                document_id.clone(),
                index as i32,
                piece.clone(),
                content_hash(piece.as_bytes()),
            );
            let created = self.db.create_chunk(&chunk)?;

            // A pre-existing fingerprint comes back with its original id
            let fresh = created.id == chunk.id;
            if fresh {
                if self.embeddings_enabled {
                    self.enqueue(TaskType::EmbedChunk, &created.id)?;
                }
                self.enqueue(TaskType::ExtractErrorCodes, &created.id)?;
            }
            chunks.push(created);
        }

        debug!("Document {} split into {} chunks", document_id, chunks.len());
        Ok(chunks)
    }

    /// Store an embedding for a chunk and mark it searchable.
    pub fn record_embedding(&self, chunk_id: &str, vector: &[f32]) -> IngestResult<()> {
        self.db
            .upsert_embedding(&chunk_id.to_string(), &self.model, vector)?;
        self.db
            .set_chunk_status(&chunk_id.to_string(), ChunkStatus::Completed)?;
        Ok(())
    }

    /// Run pattern extraction over a chunk and file the candidates.
    /// Returns how many candidates were submitted.
    pub fn extract_chunk_codes(&self, chunk_id: &str) -> IngestResult<usize> {
        let chunk = self.db.get_chunk(&chunk_id.to_string())?;
        let document = self.db.get_resource(&chunk.document_id)?;

        let extracted = extract_error_codes(&chunk.text);
        let count = extracted.len();

        for candidate in extracted {
            let mut source = ErrorCodeSource::from_chunk(chunk.id.clone(), chunk.document_id.clone());
            if let Some(m) = &document.manufacturer_id {
                source = source.with_manufacturer(m.clone());
            }

            let record = ErrorCodeRecord::new(candidate.code, candidate.context, source)
                .with_severity(candidate.severity)
                .with_confidence(candidate.confidence);
            self.db.upsert_error_code_candidate(&record)?;
        }

        if count > 0 {
            debug!("Chunk {} yielded {} error-code candidates", chunk_id, count);
        }
        Ok(count)
    }

    /// The embedding model this pipeline writes vectors for.
    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    fn enqueue(&self, task_type: TaskType, target_ref: &str) -> IngestResult<()> {
        let task = IngestionTask::new(task_type, target_ref)
            .with_max_retries(self.queue.max_retries)
            .with_timeout_secs(self.queue.task_timeout_secs);
        self.db.enqueue_task(&task)?;
        Ok(())
    }
}

/// Paragraph-packing splitter. Blank lines delimit paragraphs; paragraphs
/// pack into chunks up to the target size, and a single oversized paragraph
/// splits at the cap.
fn split_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > CHUNK_TARGET_CHARS {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.len() > CHUNK_TARGET_CHARS {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut rest = paragraph;
            while rest.len() > CHUNK_TARGET_CHARS {
                let mut cut = CHUNK_TARGET_CHARS;
                while !rest.is_char_boundary(cut) {
                    cut -= 1;
                }
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            if !rest.is_empty() {
                current.push_str(rest);
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixfinder_core::TaskStatus;

    fn pipeline() -> (IngestPipeline, Database) {
        let db = Database::open_in_memory().unwrap();
        let mut config = Config::default();
        config.embedding.dimensions = 3;
        config.embedding.command = Some("embed-stub".to_string());
        (IngestPipeline::new(db.clone(), &config), db)
    }

    #[test]
    fn test_submit_document_queues_chunking() {
        let (pipeline, db) = pipeline();

        let intake = pipeline
            .submit_document(
                b"manual bytes",
                "X100 manual",
                ResourceType::Manual,
                Some("acme"),
                None,
                None,
            )
            .unwrap();

        assert!(!intake.deduplicated);
        let counts = db.queue_counts().unwrap();
        assert_eq!(counts.pending, 1);
    }

    #[test]
    fn test_duplicate_bytes_short_circuit() {
        let (pipeline, db) = pipeline();

        let first = pipeline
            .submit_document(b"same bytes", "First title", ResourceType::Manual, None, None, None)
            .unwrap();
        let second = pipeline
            .submit_document(b"same bytes", "Other title", ResourceType::Bulletin, None, None, None)
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.resource.id, first.resource.id);
        // No second chunking task
        assert_eq!(db.queue_counts().unwrap().pending, 1);
    }

    #[test]
    fn test_non_document_type_rejected() {
        let (pipeline, _db) = pipeline();
        let result =
            pipeline.submit_document(b"clip", "Teardown", ResourceType::Video, Some("acme"), None, None);
        assert!(matches!(result, Err(IngestError::InvalidIntake(_))));
    }

    #[test]
    fn test_chunking_queues_followup_tasks() {
        let (pipeline, db) = pipeline();

        let intake = pipeline
            .submit_document(b"doc", "Manual", ResourceType::Manual, None, None, None)
            .unwrap();

        let chunks = pipeline
            .chunk_document(
                &intake.resource.id,
                "First procedure paragraph.\n\nSecond procedure paragraph.",
            )
            .unwrap();
        assert_eq!(chunks.len(), 1); // Both paragraphs fit one chunk

        // Intake task + embed + extract
        assert_eq!(db.queue_counts().unwrap().pending, 3);

        // Re-chunking identical text is a no-op
        let again = pipeline
            .chunk_document(
                &intake.resource.id,
                "First procedure paragraph.\n\nSecond procedure paragraph.",
            )
            .unwrap();
        assert_eq!(again[0].id, chunks[0].id);
        assert_eq!(db.queue_counts().unwrap().pending, 3);
    }

    #[test]
    fn test_record_embedding_completes_chunk() {
        let (pipeline, db) = pipeline();

        let intake = pipeline
            .submit_document(b"doc", "Manual", ResourceType::Manual, None, None, None)
            .unwrap();
        let chunks = pipeline
            .chunk_document(&intake.resource.id, "Fuser replacement steps.")
            .unwrap();

        pipeline
            .record_embedding(&chunks[0].id, &[0.1, 0.2, 0.3])
            .unwrap();

        let chunk = db.get_chunk(&chunks[0].id).unwrap();
        assert_eq!(chunk.status, ChunkStatus::Completed);
    }

    #[test]
    fn test_extract_chunk_codes_files_candidates() {
        let (pipeline, db) = pipeline();

        let intake = pipeline
            .submit_document(b"doc", "Manual", ResourceType::Manual, Some("acme"), None, None)
            .unwrap();
        let chunks = pipeline
            .chunk_document(
                &intake.resource.id,
                "Error code C-2801 indicates a fuser thermistor fault.",
            )
            .unwrap();

        let count = pipeline.extract_chunk_codes(&chunks[0].id).unwrap();
        assert_eq!(count, 1);

        let records = db.find_error_codes("C-2801", Some("acme")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source.chunk_id.as_deref(), Some(chunks[0].id.as_str()));
    }

    #[test]
    fn test_submit_image_stores_and_queues() {
        let (pipeline, db) = pipeline();

        let (content, queued) = pipeline.submit_image(b"png bytes").unwrap();
        assert!(queued);

        let tasks = db.list_tasks(Some(TaskStatus::Pending), None, 10).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].target_ref, content.id);

        let (_, queued_again) = pipeline.submit_image(b"png bytes").unwrap();
        assert!(!queued_again);
        assert_eq!(db.queue_counts().unwrap().pending, 1);
    }

    #[test]
    fn test_split_text_packs_paragraphs() {
        let text = "Short one.\n\nShort two.";
        assert_eq!(split_text(text).len(), 1);

        let long_paragraph = "x".repeat(2500);
        let pieces = split_text(&long_paragraph);
        assert!(pieces.len() >= 3);
        assert!(pieces.iter().all(|p| p.len() <= CHUNK_TARGET_CHARS));
    }
}
