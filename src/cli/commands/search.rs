use anyhow::{Context, Result};
use clap::Args;

use super::{Providers, open_knowledge_base};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<u32>,

    #[arg(long, help = "Minimum similarity score threshold (0.0-1.0)")]
    pub min_score: Option<f32>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let mut config = Config::load()?;
    let formatter = get_formatter(format);

    let limit = args.limit.unwrap_or(config.search.top_k);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    if let Some(score) = args.min_score {
        if !(0.0..=1.0).contains(&score) {
            anyhow::bail!("min_score must be between 0.0 and 1.0");
        }
        config.search.min_similarity = Some(score);
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {limit}");
        if let Some(score) = config.search.min_similarity {
            eprintln!("  Min score: {score:.3}");
        }
    }

    let kb = open_knowledge_base(
        config,
        Providers {
            embedding: true,
            ..Default::default()
        },
    )
    .await?;

    let results = kb
        .search(query, limit as usize)
        .await
        .context("search failed")?;

    print!("{}", formatter.format_search_results(&results));

    Ok(())
}
