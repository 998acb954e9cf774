//! Lookup command - direct error-code catalog queries.

use super::get_database;
use anyhow::Result;
use colored::Colorize;
use fixfinder_core::Severity;

pub fn run(code: &str, manufacturer: Option<String>) -> Result<()> {
    let db = get_database()?;

    let records = db.find_error_codes(code, manufacturer.as_deref())?;

    if records.is_empty() {
        println!("{} No catalog entry for '{}'", "Not found:".yellow().bold(), code);
        println!("  Try {} to search documents instead", format!("fixfinder search \"{}\"", code).cyan());
        return Ok(());
    }

    println!(
        "{} {} ({} match{})",
        "Error code".cyan().bold(),
        code,
        records.len(),
        if records.len() == 1 { "" } else { "es" }
    );
    println!("{}", "─".repeat(70));

    for record in &records {
        let severity = match record.severity {
            Severity::Critical => "CRITICAL".red().bold(),
            Severity::High => "HIGH".red(),
            Severity::Medium => "MEDIUM".yellow(),
            Severity::Low => "LOW".green(),
        };

        println!();
        println!("{} [{}]", record.error_code.white().bold(), severity);
        println!("  {}", record.description);
        if let Some(solution) = &record.solution {
            println!("  {} {}", "Fix:".green().bold(), solution);
        }
        if let Some(m) = &record.source.manufacturer_id {
            println!("  {} {}", "Manufacturer:".dimmed(), m);
        }

        let provenance = if record.verified {
            format!(
                "verified by {}",
                record.verified_by.as_deref().unwrap_or("unknown")
            )
            .green()
        } else {
            format!("unverified, confidence {:.2}", record.confidence).yellow()
        };
        println!("  {} {}", "Status:".dimmed(), provenance);
        println!("  {} {}", "id:".dimmed(), record.id.dimmed());
    }

    Ok(())
}
