//! Search command - hybrid vector + keyword search.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use sift_memory::{ContentType, SearchResult};

use super::{Context, parse_content_type, truncate};

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Candidates requested from each index
    #[arg(short, long)]
    pub k: Option<usize>,

    /// RRF smoothing constant
    #[arg(long)]
    pub rrf_k: Option<f64>,

    /// Weight of the vector ranking
    #[arg(long)]
    pub weight_vector: Option<f64>,

    /// Weight of the keyword ranking
    #[arg(long)]
    pub weight_keyword: Option<f64>,

    /// Only return memories of this type
    #[arg(short = 't', long = "type", value_parser = parse_content_type)]
    pub content_type: Option<ContentType>,

    /// Drop results scoring below this
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum results to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Deadline for the search in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Run the search command.
pub async fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let dim = Style::new().dim();

    let mut query = engine.query(&args.query);
    if let Some(k) = args.k {
        query = query.with_k(k);
    }
    if let Some(rrf_k) = args.rrf_k {
        query = query.with_rrf_k(rrf_k);
    }
    if args.weight_vector.is_some() || args.weight_keyword.is_some() {
        let weight_vector = args.weight_vector.unwrap_or(query.weight_vector);
        let weight_keyword = args.weight_keyword.unwrap_or(query.weight_keyword);
        query = query.with_weights(weight_vector, weight_keyword);
    }
    if let Some(content_type) = args.content_type {
        query = query.with_content_type(content_type);
    }
    if let Some(threshold) = args.threshold {
        query = query.with_relevance_threshold(threshold);
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }
    if let Some(ms) = args.timeout_ms {
        query = query.with_timeout(Duration::from_millis(ms));
    }

    if ctx.verbose {
        println!(
            "{}",
            dim.apply_to(format!(
                "Searching: \"{}\" (k: {}, rrf_k: {}, weights: {}/{})",
                query.text, query.k, query.rrf_k, query.weight_vector, query.weight_keyword
            ))
        );
        println!();
    }

    let results = engine.search(query).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", dim.apply_to("No results found"));
        return Ok(());
    }

    println!("{}", style("Search Results").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", style(i + 1).cyan(), truncate(&result.content, 70));
        println!(
            "   {}",
            dim.apply_to(format!(
                "{} · score {:.4} · {}",
                result.content_type,
                result.combined_score,
                sources(result)
            ))
        );
        if ctx.verbose {
            println!("   {}", dim.apply_to(result.record_id.to_string()));
        }
        println!();
    }

    Ok(())
}

/// Which methods found a result, with ranks.
fn sources(result: &SearchResult) -> String {
    match (result.vector_rank, result.keyword_rank) {
        (Some(v), Some(k)) => format!("vector #{v}, keyword #{k}"),
        (Some(v), None) => format!("vector #{v}"),
        (None, Some(k)) => format!("keyword #{k}"),
        (None, None) => "-".to_string(),
    }
}
