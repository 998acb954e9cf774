//! Worker command - run the ingestion queue.

use super::embedder::CommandEmbedder;
use super::{get_database, load_config};
use anyhow::Result;
use colored::Colorize;
use fixfinder_core::{IngestionTask, TaskType};
use fixfinder_ingest::{IngestError, IngestPipeline, IngestResult, TaskHandler, Worker, WorkerPool};
use std::sync::Arc;
use tracing::info;

/// Dispatches claimed tasks to the ingestion pipeline.
struct PipelineHandler {
    pipeline: IngestPipeline,
    db: fixfinder_db::Database,
    embedder: Option<CommandEmbedder>,
}

impl TaskHandler for PipelineHandler {
    fn handle(&self, task: &IngestionTask) -> IngestResult<()> {
        match task.task_type {
            TaskType::IngestDocument => self.ingest_document(&task.target_ref),
            TaskType::ChunkDocument => self.chunk_document(&task.target_ref),
            TaskType::EmbedChunk => self.embed_chunk(&task.target_ref),
            TaskType::ExtractErrorCodes => {
                self.pipeline.extract_chunk_codes(&task.target_ref)?;
                Ok(())
            }
            TaskType::IngestImage => {
                // Content is already stored; OCR backends plug in here
                info!("No image processor configured, leaving {} stored as-is", task.target_ref);
                Ok(())
            }
        }
    }
}

impl PipelineHandler {
    /// Deferred intake. The payload carries what `fixfinder ingest` knew.
    fn ingest_document(&self, payload: &str) -> IngestResult<()> {
        let parsed: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| IngestError::InvalidIntake(format!("bad intake payload: {}", e)))?;

        let path = parsed["path"]
            .as_str()
            .ok_or_else(|| IngestError::InvalidIntake("payload missing path".to_string()))?;
        let title = parsed["title"].as_str().unwrap_or(path);
        let doc_type = parsed["doc_type"]
            .as_str()
            .and_then(fixfinder_core::ResourceType::from_str)
            .unwrap_or(fixfinder_core::ResourceType::Manual);

        let bytes = std::fs::read(path)
            .map_err(|e| IngestError::InvalidIntake(format!("cannot read {}: {}", path, e)))?;

        self.pipeline.submit_document(
            &bytes,
            title,
            doc_type,
            parsed["manufacturer"].as_str(),
            parsed["series"].as_str(),
            Some(path),
        )?;
        Ok(())
    }

    fn chunk_document(&self, document_id: &str) -> IngestResult<()> {
        let resource = self.db.get_resource(&document_id.to_string())?;
        let path = resource.url.as_deref().ok_or_else(|| {
            IngestError::InvalidIntake(format!(
                "document '{}' has no source path to read",
                resource.title
            ))
        })?;

        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestError::InvalidIntake(format!("cannot read {}: {}", path, e)))?;

        self.pipeline.chunk_document(&document_id.to_string(), &text)?;
        Ok(())
    }

    fn embed_chunk(&self, chunk_id: &str) -> IngestResult<()> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            IngestError::Embedding("no embedder command configured".to_string())
        })?;

        let chunk = self.db.get_chunk(&chunk_id.to_string())?;
        let vector = embedder
            .embed_text(&chunk.text)
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        self.pipeline.record_embedding(chunk_id, &vector)
    }
}

pub fn run(count: usize, once: bool) -> Result<()> {
    let db = get_database()?.with_actor("worker");
    let config = load_config()?;

    let handler = Arc::new(PipelineHandler {
        pipeline: IngestPipeline::new(db.clone(), &config),
        db: db.clone(),
        embedder: CommandEmbedder::from_config(&config),
    });

    if once {
        let worker = Worker::new(db, config.queue.clone(), handler);
        let processed = worker.run_until_idle()?;
        println!(
            "{} Processed {} task{}",
            "✓".green(),
            processed,
            if processed == 1 { "" } else { "s" }
        );
        return Ok(());
    }

    println!(
        "{} Running {} worker{} (Ctrl-C to stop)",
        "▶".cyan(),
        count,
        if count == 1 { "" } else { "s" }
    );

    let pool = WorkerPool::new(db, config.queue.clone(), handler);
    pool.run(count)?;
    Ok(())
}
