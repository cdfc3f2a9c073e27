//! Maintenance commands - reindex and consistency checks.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use sift_memory::ConsistencyReport;

use super::{Context, build_embedder_spec};

/// Arguments for the reindex command.
#[derive(Args, Debug)]
pub struct ReindexArgs {
    /// Show what would be done without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Rebuild any index that is out of step with the records table
    #[arg(long)]
    pub repair: bool,
}

/// Run the reindex command.
pub async fn reindex(args: ReindexArgs, ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;

    if args.dry_run {
        let dry = store.reindex_dry_run()?;
        if ctx.json_output {
            println!("{}", serde_json::to_string_pretty(&dry)?);
            return Ok(());
        }
        println!("{}", style("Reindex Dry Run").bold());
        println!("{}", dim.apply_to("─".repeat(50)));
        println!();
        println!("  Memories to embed:  {}", style(dry.record_count).cyan());
        println!(
            "  Estimated tokens:   {}",
            style(format!("~{}", dry.estimated_tokens)).cyan()
        );
        println!();
        return Ok(());
    }

    if !ctx.vectors_enabled(&config) {
        bail!("Vector index is disabled; nothing to reindex");
    }

    let embedding_config = config.embedding();
    let embedder = sift_embed::build_embedder(&build_embedder_spec(&embedding_config))
        .map_err(|e| anyhow::anyhow!("Failed to build embedder: {e}"))?;
    let new_dims = embedding_config.effective_dimensions();
    let new_provider = embedding_config.provider.as_str();

    let dry = store.reindex_dry_run()?;
    if !ctx.json_output {
        println!("{}", style("Memory Reindex").bold());
        println!("{}", dim.apply_to("─".repeat(50)));
        println!();
        println!("  Provider:     {}", style(new_provider).cyan());
        println!("  Dimensions:   {}", style(new_dims).cyan());
        println!("  Memories:     {}", style(dry.record_count).cyan());
        println!(
            "  Est. tokens:  {}",
            style(format!("~{}", dry.estimated_tokens)).cyan()
        );
        println!();
    }

    if !args.yes && dry.record_count > 0 {
        eprint!("Continue? [y/N] ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", dim.apply_to("Aborted."));
            return Ok(());
        }
    }

    let report = store
        .reindex(
            |texts| {
                let embedder = embedder.clone();
                async move {
                    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                    embedder.embed_batch(&refs).await.map_err(|e| e.to_string())
                }
            },
            new_dims,
            new_provider,
        )
        .await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", style("Reindex Complete").bold().green());
    println!("  Total:     {}", report.total);
    println!("  Embedded:  {}", style(report.embedded).green());
    if report.skipped > 0 {
        println!(
            "  Skipped:   {}",
            Style::new().yellow().apply_to(report.skipped)
        );
    }
    if report.superseded > 0 {
        println!(
            "  Changed:   {} (written during reindex, kept as written)",
            Style::new().yellow().apply_to(report.superseded)
        );
    }
    println!("  Elapsed:   {:.1?}", report.elapsed);

    Ok(())
}

/// Run the check command.
///
/// Fails when inconsistencies remain, so scripts can act on the exit code.
pub async fn check(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let store = ctx.open_store(&config)?;
    let mut report = store.check_consistency()?;

    if args.repair && !report.is_consistent() {
        let keyword_issues = report.missing_keyword.len() + report.orphaned_keyword.len();
        let vector_issues = report.missing_vector.len()
            + report.orphaned_vector.len()
            + report.misplaced_vector.len();

        if keyword_issues > 0 {
            let rebuilt = store.rebuild_keyword_index()?;
            if !ctx.json_output {
                println!("Rebuilt keyword index ({rebuilt} entries)");
            }
        }
        if vector_issues > 0 {
            if store.vectors_available() {
                let rebuilt = store.rebuild_vector_index()?;
                if !ctx.json_output {
                    println!("Rebuilt vector index ({rebuilt} entries)");
                }
            } else {
                eprintln!(
                    "{} vector index unavailable; run `sift reindex` instead",
                    Style::new().yellow().apply_to("Warning:")
                );
            }
        }
        report = store.check_consistency()?;
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_consistent() {
        bail!(
            "{} consistency issue(s) found{}",
            report.issue_count(),
            if args.repair { "" } else { "; run `sift check --repair`" }
        );
    }
    Ok(())
}

fn print_report(report: &ConsistencyReport) {
    let dim = Style::new().dim();
    println!("{}", style("Index Consistency").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();

    let rows = [
        ("Missing keyword entries", &report.missing_keyword),
        ("Orphaned keyword entries", &report.orphaned_keyword),
        ("Missing vector entries", &report.missing_vector),
        ("Orphaned vector entries", &report.orphaned_vector),
        ("Misplaced vector entries", &report.misplaced_vector),
    ];
    for (label, ids) in rows {
        if ids.is_empty() {
            println!("  {label:<26} {}", Style::new().green().apply_to(0));
        } else {
            println!("  {label:<26} {}", Style::new().red().apply_to(ids.len()));
        }
    }
    println!();

    if report.is_consistent() {
        println!("{}", Style::new().green().apply_to("ok"));
    }
}
