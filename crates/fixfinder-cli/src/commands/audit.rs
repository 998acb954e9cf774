//! Audit command - inspect the append-only audit log.

use super::get_database;
use anyhow::Result;
use chrono::{Duration, Utc};
use colored::Colorize;
use fixfinder_core::AuditRecord;

pub fn run(id: Option<String>, entity: Option<String>, hours: i64) -> Result<()> {
    let db = get_database()?;

    let records = match (&entity, &id) {
        (Some(entity), Some(id)) => db.get_audit_trail(entity, id)?,
        (None, Some(_)) => {
            anyhow::bail!("--id requires --entity (the table the id belongs to)");
        }
        _ => {
            let end = Utc::now();
            let start = end - Duration::hours(hours);
            let mut records = db.audit_between(start, end)?;
            if let Some(entity) = &entity {
                records.retain(|r| &r.entity_name == entity);
            }
            records
        }
    };

    if records.is_empty() {
        println!("{}", "No audit entries.".dimmed());
        return Ok(());
    }

    println!("{} ({})", "Audit trail".cyan().bold(), records.len());
    println!("{}", "─".repeat(70));

    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &AuditRecord) {
    println!(
        "{}  {:<7} {:<12} {}  {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.operation.to_string(),
        record.entity_name,
        record.entity_id.get(..8).unwrap_or(&record.entity_id).dimmed(),
        format!("by {}", record.actor).dimmed()
    );
}
