//! Content command - dedup check against the content store.

use super::{format_size, get_database};
use anyhow::Result;
use colored::Colorize;
use fixfinder_db::content_hash;

/// Look up a content record by hash, or by hashing a local file first.
pub fn run(hash_or_path: &str) -> Result<()> {
    let db = get_database()?;

    let hash = if std::path::Path::new(hash_or_path).exists() {
        let bytes = std::fs::read(hash_or_path)?;
        let hash = content_hash(&bytes);
        println!("{} {}", "Hash:".dimmed(), hash);
        hash
    } else {
        hash_or_path.to_string()
    };

    match db.get_content_by_hash(&hash)? {
        Some(record) => {
            println!("{} Content is already stored", "✓".green());
            println!("  id:      {}", record.id.dimmed());
            println!("  size:    {}", format_size(record.size));
            println!(
                "  stored:  {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S")
            );

            if let Some(resource) = db.find_resource_by_content(&record.id)? {
                println!(
                    "  resource: {} ({})",
                    resource.title,
                    resource.resource_type
                );
            }
        }
        None => {
            println!("{}", "Not stored; ingesting it would create a new record.".dimmed());
        }
    }

    Ok(())
}
