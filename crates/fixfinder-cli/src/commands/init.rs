//! Initialize fixfinder.

use super::get_paths;
use anyhow::{Context, Result};
use colored::Colorize;
use fixfinder_config::Config;
use fixfinder_db::Database;

pub fn run() -> Result<()> {
    let paths = get_paths()?;

    if paths.is_initialized() {
        println!("{} Fixfinder is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Database: {}", paths.database_file.display());
        return Ok(());
    }

    println!("{}", "Initializing fixfinder...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    println!("  {} Created directories", "✓".green());

    Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
    println!(
        "  {} Created config: {}",
        "✓".green(),
        paths.config_file.display()
    );

    let _db = Database::open(&paths.database_file).context("Failed to initialize database")?;
    println!(
        "  {} Created database: {}",
        "✓".green(),
        paths.database_file.display()
    );

    println!();
    println!("{}", "Fixfinder initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Ingest a manual: {}", "fixfinder ingest manual.txt -m acme".cyan());
    println!("  2. Run the workers: {}", "fixfinder worker --once".cyan());
    println!("  3. Search: {}", "fixfinder search \"C-2801\"".cyan());

    Ok(())
}
