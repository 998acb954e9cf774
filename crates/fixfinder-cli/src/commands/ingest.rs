//! Ingest command - submit documents for processing.

use super::{get_database, load_config, parse_doc_type};
use anyhow::{Context, Result};
use colored::Colorize;
use fixfinder_core::{IngestionTask, TaskType};
use fixfinder_ingest::IngestPipeline;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];

pub fn run(
    path: &str,
    doc_type: &str,
    title: Option<String>,
    manufacturer: Option<String>,
    series: Option<String>,
    queue: bool,
) -> Result<()> {
    let resource_type = parse_doc_type(doc_type)?;
    let db = get_database()?;
    let config = load_config()?;

    let root = Path::new(path);
    if !root.exists() {
        anyhow::bail!("Path does not exist: {}", path);
    }

    let files = collect_files(root)?;
    if files.is_empty() {
        anyhow::bail!("No ingestible documents under {} (looking for .txt/.md)", path);
    }
    if files.len() > 1 && title.is_some() {
        anyhow::bail!("--title only applies to a single file");
    }

    if queue {
        // Defer even the intake to the workers
        for file in &files {
            let payload = json!({
                "path": file.display().to_string(),
                "title": title.clone().unwrap_or_else(|| file_title(file)),
                "doc_type": resource_type.as_str(),
                "manufacturer": manufacturer,
                "series": series,
            });
            let task = IngestionTask::new(TaskType::IngestDocument, payload.to_string())
                .with_max_retries(config.queue.max_retries)
                .with_timeout_secs(config.queue.task_timeout_secs);
            db.enqueue_task(&task)?;
        }
        println!(
            "{} Queued {} document{} for ingestion",
            "✓".green(),
            files.len(),
            if files.len() == 1 { "" } else { "s" }
        );
        return Ok(());
    }

    let pipeline = IngestPipeline::new(db, &config);

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/dim} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut ingested = 0usize;
    let mut deduplicated = 0usize;

    for file in &files {
        bar.set_message(file_title(file));

        let bytes =
            std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let file_name = title.clone().unwrap_or_else(|| file_title(file));

        let intake = pipeline.submit_document(
            &bytes,
            &file_name,
            resource_type,
            manufacturer.as_deref(),
            series.as_deref(),
            Some(&file.display().to_string()),
        )?;

        if intake.deduplicated {
            deduplicated += 1;
        } else {
            ingested += 1;
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!(
        "{} Ingested {} document{}, {} already known",
        "✓".green(),
        ingested,
        if ingested == 1 { "" } else { "s" },
        deduplicated
    );
    if ingested > 0 {
        println!(
            "  Run {} to chunk and index them",
            "fixfinder worker --once".cyan()
        );
    }

    Ok(())
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_document = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_document {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
