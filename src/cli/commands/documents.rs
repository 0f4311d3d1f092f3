use anyhow::{Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use super::{Providers, open_knowledge_base};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum DocumentsCommand {
    #[command(about = "List ingested documents")]
    List,
    #[command(about = "Show one document")]
    Show {
        #[arg(help = "Document ID")]
        id: Uuid,
    },
    #[command(about = "Delete a document and its passages")]
    Delete {
        #[arg(help = "Document ID")]
        id: Uuid,
    },
}

pub async fn handle_documents(
    cmd: DocumentsCommand,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let kb = open_knowledge_base(config, Providers::default()).await?;

    match cmd {
        DocumentsCommand::List => {
            let documents = kb
                .list_documents()
                .await
                .context("failed to list documents")?;
            print!("{}", formatter.format_documents(&documents));
        }
        DocumentsCommand::Show { id } => {
            let document = kb.get_document(id).await?;
            print!("{}", formatter.format_document(&document));
        }
        DocumentsCommand::Delete { id } => {
            kb.delete_document(id).await?;
            print!(
                "{}",
                formatter.format_message(&format!("Deleted document {}", id))
            );
        }
    }

    Ok(())
}
