//! Stats command - database statistics.

use super::get_database;
use anyhow::Result;
use colored::Colorize;

pub fn run() -> Result<()> {
    let db = get_database()?;
    let stats = db.get_stats()?;

    println!("{}", "Fixfinder Statistics".cyan().bold());
    println!("{}", "─".repeat(50));

    println!();
    println!("{}", "Library".white().bold());
    println!("  Resources:        {}", stats.resources.to_string().green());
    println!("  Content records:  {}", stats.content_records);
    println!("  Chunks:           {}", stats.chunks);
    println!(
        "  Embedded chunks:  {} ({} vectors)",
        stats.embedded_chunks, stats.embeddings
    );

    println!();
    println!("{}", "Error-Code Catalog".white().bold());
    println!("  Records:  {}", stats.error_codes);
    println!(
        "  Verified: {}",
        stats.verified_error_codes.to_string().green()
    );

    println!();
    println!("{}", "Queue".white().bold());
    println!("  Pending:    {}", stats.queue.pending);
    println!("  Processing: {}", stats.queue.processing);
    println!("  Completed:  {}", stats.queue.completed);
    if stats.queue.failed > 0 {
        println!("  Failed:     {}", stats.queue.failed.to_string().red());
    }

    println!();
    println!("{}", "Audit".white().bold());
    println!("  Log entries: {}", stats.audit_entries);

    Ok(())
}
