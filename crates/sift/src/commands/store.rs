//! Store command - add a memory.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use sift_memory::ContentType;

use super::{Context, parse_content_type};

/// Arguments for the store command.
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Content to store
    pub content: String,

    /// Content type (code, documentation, context, decision, learning, output, error)
    #[arg(short = 't', long = "type", value_parser = parse_content_type)]
    pub content_type: ContentType,

    /// Relevance score in [0, 1]
    #[arg(short, long)]
    pub relevance: Option<f64>,
}

/// Run the store command.
pub async fn run(args: StoreArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let id = engine
        .store(args.content, args.content_type, args.relevance)
        .await?;

    if ctx.json_output {
        let record = engine.get(id).await?;
        let has_embedding = record.as_ref().is_some_and(|r| r.has_embedding());
        let out = serde_json::json!({
            "id": id,
            "content_type": args.content_type,
            "has_embedding": has_embedding,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} {}", style("Stored").green().bold(), style(id).cyan());
        if ctx.verbose {
            let dim = Style::new().dim();
            println!("{}", dim.apply_to(format!("type: {}", args.content_type)));
        }
    }

    Ok(())
}
