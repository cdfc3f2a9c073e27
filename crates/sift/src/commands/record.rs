//! Record commands - get, update and delete a single memory.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use sift_memory::{ContentType, MemoryId, MemoryRecord, RecordUpdate};

use super::{Context, parse_content_type};

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Memory id
    pub id: String,
}

/// Arguments for the update command.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Memory id
    pub id: String,

    /// New content (re-embedded)
    #[arg(short, long)]
    pub content: Option<String>,

    /// New content type
    #[arg(short = 't', long = "type", value_parser = parse_content_type)]
    pub content_type: Option<ContentType>,

    /// New relevance score in [0, 1]
    #[arg(short, long)]
    pub relevance: Option<f64>,
}

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Memory id
    pub id: String,
}

/// JSON view of a record; the raw embedding is left out.
#[derive(Serialize)]
struct RecordView<'a> {
    id: MemoryId,
    content: &'a str,
    content_type: ContentType,
    relevance_score: f64,
    access_count: u32,
    last_accessed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    embedding_dimensions: Option<usize>,
}

impl<'a> From<&'a MemoryRecord> for RecordView<'a> {
    fn from(record: &'a MemoryRecord) -> Self {
        Self {
            id: record.id,
            content: &record.content,
            content_type: record.content_type,
            relevance_score: record.relevance_score,
            access_count: record.access_count,
            last_accessed_at: record.last_accessed_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            embedding_dimensions: record.embedding.as_ref().map(Vec::len),
        }
    }
}

/// Run the get command.
pub async fn get(args: GetArgs, ctx: &Context) -> Result<()> {
    let id = MemoryId::parse(&args.id)?;
    let engine = ctx.open_engine()?;

    let Some(record) = engine.get(id).await? else {
        bail!("Memory {id} not found");
    };
    print_record(&record, ctx)
}

/// Run the update command.
pub async fn update(args: UpdateArgs, ctx: &Context) -> Result<()> {
    let id = MemoryId::parse(&args.id)?;

    let mut changes = RecordUpdate::new();
    if let Some(content) = args.content {
        changes = changes.content(content);
    }
    if let Some(content_type) = args.content_type {
        changes = changes.content_type(content_type);
    }
    if let Some(relevance) = args.relevance {
        changes = changes.relevance_score(relevance);
    }
    if changes.is_empty() {
        bail!("Nothing to update: pass --content, --type or --relevance");
    }

    let engine = ctx.open_engine()?;
    let record = engine.update(id, changes).await?;

    if ctx.json_output {
        return print_record(&record, ctx);
    }
    println!("{} {}", style("Updated").green().bold(), style(id).cyan());
    Ok(())
}

/// Run the delete command. Deleting a missing memory is not an error.
pub async fn delete(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let id = MemoryId::parse(&args.id)?;
    let engine = ctx.open_engine()?;
    let deleted = engine.delete(id).await?;

    if ctx.json_output {
        let out = serde_json::json!({ "id": id, "deleted": deleted });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if deleted {
        println!("{} {}", style("Deleted").green().bold(), style(id).cyan());
    } else {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(format!("Memory {id} not found")));
    }
    Ok(())
}

fn print_record(record: &MemoryRecord, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&RecordView::from(record))?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style(record.id).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("  Type:        {}", style(record.content_type).cyan());
    println!("  Relevance:   {:.2}", record.relevance_score);
    println!("  Accessed:    {} times", record.access_count);
    println!("  Created:     {}", record.created_at.to_rfc3339());
    println!("  Updated:     {}", record.updated_at.to_rfc3339());
    match &record.embedding {
        Some(embedding) => println!("  Embedding:   {} dims", embedding.len()),
        None => println!("  Embedding:   {}", dim.apply_to("(none)")),
    }
    println!();
    println!("{}", record.content);
    Ok(())
}
