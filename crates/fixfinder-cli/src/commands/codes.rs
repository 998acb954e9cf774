//! Catalog management commands.

use super::get_database;
use anyhow::Result;
use colored::Colorize;

pub fn verify(id: &str, reviewer: &str) -> Result<()> {
    let db = get_database()?;
    db.mark_error_code_verified(&id.to_string(), reviewer)?;

    let record = db.get_error_code(&id.to_string())?;
    println!(
        "{} {} verified by {}",
        "✓".green(),
        record.error_code.white().bold(),
        reviewer
    );
    Ok(())
}

pub fn supersede(old_id: &str, new_id: &str) -> Result<()> {
    let db = get_database()?;
    db.supersede_error_code(&old_id.to_string(), &new_id.to_string())?;

    println!(
        "{} {} superseded by {}",
        "✓".green(),
        old_id.dimmed(),
        new_id
    );
    Ok(())
}

pub fn duplicates() -> Result<()> {
    let db = get_database()?;
    let duplicates = db.find_duplicate_error_codes()?;

    if duplicates.is_empty() {
        println!("{}", "No folded duplicates.".dimmed());
        return Ok(());
    }

    println!(
        "{} ({})",
        "Folded duplicate candidates".cyan().bold(),
        duplicates.len()
    );
    println!("{}", "─".repeat(70));

    for dup in &duplicates {
        println!(
            "{}  confidence {:.2}  kept {}  {}",
            dup.error_code.white().bold(),
            dup.discarded_confidence,
            dup.kept_id.dimmed(),
            dup.seen_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }

    Ok(())
}
