use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use super::{Providers, open_knowledge_base};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the ingested documents")]
    pub question: String,

    #[arg(long, short = 'c', help = "Continue an existing conversation")]
    pub conversation: Option<Uuid>,

    #[arg(long, short = 'k', help = "Number of passages to retrieve")]
    pub top_k: Option<usize>,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if args.top_k == Some(0) {
        anyhow::bail!("top-k must be at least 1");
    }

    if verbose {
        eprintln!("Question: \"{}\"", args.question.trim());
        if let Some(id) = args.conversation {
            eprintln!("  Conversation: {id}");
        }
        eprintln!("  Top-k: {}", args.top_k.unwrap_or(config.search.top_k as usize));
    }

    let kb = open_knowledge_base(
        config,
        Providers {
            embedding: true,
            generation: true,
        },
    )
    .await?;

    let response = kb
        .ask(&args.question, args.conversation, args.top_k)
        .await
        .context("failed to answer question")?;

    print!("{}", formatter.format_answer(&response));

    Ok(())
}
