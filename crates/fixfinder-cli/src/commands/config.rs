//! Config commands.

use super::{get_paths, load_config};
use anyhow::{Context, Result};
use colored::Colorize;

pub fn show() -> Result<()> {
    // Validates the file before printing it
    let _config = load_config()?;

    let paths = get_paths()?;
    let rendered = if paths.config_file.exists() {
        std::fs::read_to_string(&paths.config_file).context("Failed to read config file")?
    } else {
        format!(
            "# No config file at {} (showing defaults)\n\n{}",
            paths.config_file.display(),
            fixfinder_config::Config::default_config_string()
        )
    };

    println!("{}", "Current configuration".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("{}", rendered);
    Ok(())
}

pub fn path() -> Result<()> {
    let paths = get_paths()?;
    println!("Config:   {}", paths.config_file.display());
    println!("Database: {}", paths.database_file.display());
    Ok(())
}
