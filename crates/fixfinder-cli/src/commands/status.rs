//! Status command - queue health at a glance.

use super::get_database;
use anyhow::Result;
use colored::Colorize;

pub fn run() -> Result<()> {
    let db = get_database()?;
    let counts = db.queue_counts()?;

    println!("{}", "Queue Status".cyan().bold());
    println!("{}", "─".repeat(40));
    println!("  Pending:    {}", counts.pending.to_string().yellow());
    println!("  Processing: {}", counts.processing.to_string().cyan());
    println!("  Completed:  {}", counts.completed.to_string().green());
    if counts.failed > 0 {
        println!("  Failed:     {}", counts.failed.to_string().red());
        println!();
        println!(
            "  Inspect failures with {}",
            "fixfinder tasks dead-letter".cyan()
        );
    } else {
        println!("  Failed:     0");
    }
    if counts.cancelled > 0 {
        println!("  Cancelled:  {}", counts.cancelled.to_string().dimmed());
    }

    Ok(())
}
