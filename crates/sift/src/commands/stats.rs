//! Stats command - database and index statistics.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Run the stats command.
pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;
    let stats = store.stats()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Memory Statistics").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    println!("  Memories:    {}", style(stats.record_count).cyan());
    println!("  Embedded:    {}", style(stats.embedded_count).cyan());
    println!("  Keyword idx: {}", style(stats.keyword_count).cyan());
    println!("  Vector idx:  {}", style(stats.vector_count).cyan());
    println!("  Schema:      v{}", stats.schema_version);
    println!();

    if !stats.by_content_type.is_empty() {
        println!("{}", style("By Type").bold());
        println!("{}", dim.apply_to("─".repeat(50)));
        println!();
        for (content_type, count) in &stats.by_content_type {
            println!("  {:<14} {}", content_type, style(count).cyan());
        }
        println!();
    }

    println!("{}", style("Embedding Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    match &stats.embedding_provider {
        Some(provider) => println!("  Provider:    {}", style(provider).cyan()),
        None => println!("  Provider:    {}", dim.apply_to("(not configured)")),
    }
    match stats.embedding_dimensions {
        Some(dims) => println!("  Dimensions:  {}", style(dims).cyan()),
        None => println!("  Dimensions:  {}", dim.apply_to("(not configured)")),
    }
    if stats.vectors_stale {
        println!(
            "  Status:      {}",
            Style::new().red().apply_to("STALE (run `sift reindex`)")
        );
    } else if stats.vectors_available {
        println!("  Status:      {}", Style::new().green().apply_to("ok"));
    } else {
        println!(
            "  Status:      {}",
            Style::new().yellow().apply_to("keyword-only")
        );
    }
    println!();

    Ok(())
}
