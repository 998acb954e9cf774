//! Search command - the unified ranked search.

use super::embedder::CommandEmbedder;
use super::{get_database, load_config, parse_doc_type};
use anyhow::Result;
use colored::Colorize;
use fixfinder_core::{ResourceHit, ResourceType};
use fixfinder_search::{SearchEngine, SearchQuery};

pub fn run(
    query: &str,
    manufacturer: Option<String>,
    series: Option<String>,
    doc_type: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let db = get_database()?;
    let config = load_config()?;

    let mut engine = SearchEngine::new(db, &config);
    if let Some(embedder) = CommandEmbedder::from_config(&config) {
        engine = engine.with_embedder(Box::new(embedder));
    }

    let mut request = SearchQuery::new(query);
    if let Some(m) = manufacturer {
        request = request.with_manufacturer(m);
    }
    if let Some(s) = series {
        request = request.with_series(s);
    }
    if let Some(t) = &doc_type {
        request = request.with_doc_type(parse_doc_type(t)?);
    }
    if let Some(l) = limit {
        request = request.with_limit(l);
    }

    println!("{} \"{}\"", "Searching for:".cyan().bold(), query);
    println!("{}", "─".repeat(70));

    let hits = engine.search(&request)?;

    if hits.is_empty() {
        println!();
        println!("{}", "No results found.".dimmed());
        println!();
        println!("Tips:");
        println!("  • Try different keywords or an error code");
        println!("  • Check 'fixfinder status' for unprocessed documents");
        return Ok(());
    }

    println!();
    println!(
        "Found {} result{}",
        hits.len().to_string().green(),
        if hits.len() == 1 { "" } else { "s" }
    );
    println!();

    for hit in &hits {
        print_hit(hit);
    }

    Ok(())
}

fn print_hit(hit: &ResourceHit) {
    let badge = match hit.resource_type {
        ResourceType::Bulletin => "BULLETIN".red().bold(),
        ResourceType::Manual => "MANUAL".blue().bold(),
        ResourceType::Video => "VIDEO".magenta().bold(),
        ResourceType::Link => "LINK".cyan().bold(),
        ResourceType::Part => "PART".yellow().bold(),
    };

    println!(
        "[{}] {} {}",
        badge,
        format!("p{}", hit.priority_level).dimmed(),
        format!("{:.2}", hit.relevance_score).dimmed()
    );
    if !hit.snippet.is_empty() {
        println!("  {}", hit.snippet);
    }
    if let Some(m) = &hit.manufacturer_id {
        println!("  {} {}", "manufacturer:".dimmed(), m);
    }
    println!("  {} {}", "id:".dimmed(), hit.id.dimmed());
    println!();
}
