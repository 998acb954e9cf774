//! CLI command implementations.

pub mod audit;
pub mod codes;
pub mod config;
pub mod content;
pub mod embedder;
pub mod ingest;
pub mod init;
pub mod lookup;
pub mod search;
pub mod stats;
pub mod status;
pub mod tasks;
pub mod worker;

use anyhow::{Context, Result};
use fixfinder_config::{AppPaths, Config};
use fixfinder_core::ResourceType;
use fixfinder_db::Database;

/// Get the application paths.
pub fn get_paths() -> Result<AppPaths> {
    AppPaths::new().context("Failed to determine application directories")
}

/// Get a database connection, ensuring fixfinder is initialized.
pub fn get_database() -> Result<Database> {
    let paths = get_paths()?;

    if !paths.is_initialized() {
        anyhow::bail!("Fixfinder is not initialized. Run 'fixfinder init' first.");
    }

    let db = Database::open(&paths.database_file).context("Failed to open database")?;
    Ok(db.with_actor("cli"))
}

/// Load configuration from the default location.
pub fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

/// Parse a document type argument (bulletin, manual).
pub fn parse_doc_type(s: &str) -> Result<ResourceType> {
    match ResourceType::from_str(s) {
        Some(rt) if rt.is_document() => Ok(rt),
        Some(rt) => anyhow::bail!("'{}' is not a document type (use bulletin or manual)", rt),
        None => anyhow::bail!("Unknown document type '{}' (use bulletin or manual)", s),
    }
}

/// Format a file size in human-readable form.
pub fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
